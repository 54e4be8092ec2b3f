use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a CRM contact. Fetched per request and never cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl Contact {
    /// `"<first> <last>"`, skipping blank parts.
    pub fn full_name(&self) -> Option<String> {
        let parts = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn display_label(&self) -> String {
        let name = self.full_name().unwrap_or_else(|| "Unnamed contact".to_owned());
        format!("{name} ({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::{Contact, ContactId};

    fn contact(first: Option<&str>, last: Option<&str>) -> Contact {
        Contact {
            id: ContactId("101".to_owned()),
            first_name: first.map(str::to_owned),
            last_name: last.map(str::to_owned),
            email: Some("ada@example.com".to_owned()),
        }
    }

    #[test]
    fn label_includes_both_names_and_id() {
        assert_eq!(contact(Some("Ada"), Some("Lovelace")).display_label(), "Ada Lovelace (101)");
    }

    #[test]
    fn label_skips_missing_or_blank_name_parts() {
        assert_eq!(contact(Some("Ada"), None).display_label(), "Ada (101)");
        assert_eq!(contact(Some("  "), Some("Lovelace")).display_label(), "Lovelace (101)");
    }

    #[test]
    fn nameless_contact_falls_back_to_placeholder() {
        assert_eq!(contact(None, None).display_label(), "Unnamed contact (101)");
    }
}
