use crate::domain::contact::ContactId;
use crate::domain::deal::DealId;
use crate::errors::CrmError;

/// A deal-to-contact link that has passed identifier validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationRequest {
    pub deal_id: DealId,
    pub contact_id: ContactId,
}

impl AssociationRequest {
    pub fn new(deal_id: &str, contact_id: &str) -> Result<Self, CrmError> {
        let deal_id = deal_id.trim();
        if deal_id.is_empty() {
            return Err(CrmError::MissingIdentifier("deal_id"));
        }
        let contact_id = contact_id.trim();
        if contact_id.is_empty() {
            return Err(CrmError::MissingIdentifier("contact_id"));
        }

        Ok(Self {
            deal_id: DealId(deal_id.to_owned()),
            contact_id: ContactId(contact_id.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::AssociationRequest;
    use crate::errors::{CrmError, ErrorKind};

    #[test]
    fn trims_and_accepts_both_identifiers() {
        let request = AssociationRequest::new(" 42 ", "7").expect("valid ids");
        assert_eq!(request.deal_id.0, "42");
        assert_eq!(request.contact_id.0, "7");
    }

    #[test]
    fn blank_identifiers_are_validation_errors() {
        let missing_deal = AssociationRequest::new("", "7").expect_err("deal id required");
        assert_eq!(missing_deal, CrmError::MissingIdentifier("deal_id"));
        assert_eq!(missing_deal.kind(), ErrorKind::Validation);

        let missing_contact = AssociationRequest::new("42", "   ").expect_err("contact id required");
        assert_eq!(missing_contact, CrmError::MissingIdentifier("contact_id"));
    }
}
