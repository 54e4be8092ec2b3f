use async_trait::async_trait;

use crate::domain::contact::Contact;
use crate::domain::deal::Deal;
use crate::errors::CrmError;

/// The three CRM operations the webhook needs.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Every contact, in the order the CRM pages them out.
    async fn fetch_all_contacts(&self) -> Result<Vec<Contact>, CrmError>;

    /// Every deal, in the order the CRM pages them out.
    async fn fetch_all_deals(&self) -> Result<Vec<Deal>, CrmError>;

    /// Associates a deal with a contact. Blank identifiers fail with
    /// [`CrmError::MissingIdentifier`] before any request is sent.
    async fn assign_deal(&self, deal_id: &str, contact_id: &str) -> Result<(), CrmError>;
}
