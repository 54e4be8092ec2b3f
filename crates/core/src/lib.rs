pub mod config;
pub mod crm;
pub mod domain;
pub mod errors;

pub use crm::CrmApi;
pub use domain::association::AssociationRequest;
pub use domain::contact::{Contact, ContactId};
pub use domain::deal::{Deal, DealId};
pub use domain::page::{collect_pages, Page};
pub use errors::{CrmError, ErrorKind, WebhookError};
