use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub name: Option<String>,
    /// Zero when the CRM reports no amount.
    pub amount: Decimal,
    pub stage: Option<String>,
}

impl Deal {
    /// Parses the CRM's string-typed amount. Absent or unparseable values become zero.
    pub fn parse_amount(raw: Option<&str>) -> Decimal {
        raw.map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn display_label(&self) -> String {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Untitled deal");
        format!("{name} - ${} ({})", self.amount, self.id)
    }
}
