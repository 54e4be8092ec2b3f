//! HubSpot CRM v3 client.
//!
//! Listing endpoints are cursor-paginated (`paging.next.after`); the client
//! walks every page through [`collect_pages`] and returns the concatenation.

use std::time::Duration;

use async_trait::async_trait;
use crmhook_core::config::CrmConfig;
use crmhook_core::crm::CrmApi;
use crmhook_core::domain::association::AssociationRequest;
use crmhook_core::domain::contact::{Contact, ContactId};
use crmhook_core::domain::deal::{Deal, DealId};
use crmhook_core::domain::page::{collect_pages, Page};
use crmhook_core::errors::CrmError;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info};

pub const PAGE_SIZE: u32 = 100;
const CONTACT_PROPERTIES: &str = "firstname,lastname,email";
const DEAL_PROPERTIES: &str = "dealname,amount,dealstage";
const DEAL_TO_CONTACT: &str = "deal_to_contact";

#[derive(Clone)]
pub struct HubspotClient {
    client: Client,
    base_url: String,
    access_token: SecretString,
    max_pages: usize,
}

impl HubspotClient {
    pub fn new(config: &CrmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            max_pages: config.max_pages,
        })
    }

    async fn list_page<T>(
        &self,
        object_type: &'static str,
        properties: &'static str,
        after: Option<String>,
    ) -> Result<Page<T>, CrmError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/crm/v3/objects/{object_type}", self.base_url);
        let limit = PAGE_SIZE.to_string();
        let mut query = vec![("properties", properties), ("limit", limit.as_str())];
        if let Some(cursor) = after.as_deref() {
            query.push(("after", cursor));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|error| transport_error("GET", &url, error))?;

        let response = ensure_success("GET", &url, response).await?;
        let payload = response
            .json::<ListResponse<T>>()
            .await
            .map_err(|error| CrmError::Decode(error.to_string()))?;

        let next_cursor = payload.paging.and_then(|paging| paging.next).map(|next| next.after);
        debug!(
            event_name = "crm.page.fetched",
            object_type,
            items = payload.results.len(),
            has_more = next_cursor.is_some(),
            "crm listing page fetched"
        );

        Ok(Page::new(payload.results, next_cursor))
    }
}

#[async_trait]
impl CrmApi for HubspotClient {
    async fn fetch_all_contacts(&self) -> Result<Vec<Contact>, CrmError> {
        let records = collect_pages(self.max_pages, |after| {
            self.list_page::<ObjectRecord<ContactProperties>>("contacts", CONTACT_PROPERTIES, after)
        })
        .await?;

        info!(event_name = "crm.contacts.listed", count = records.len(), "crm contacts listed");
        Ok(records.into_iter().map(ObjectRecord::into_contact).collect())
    }

    async fn fetch_all_deals(&self) -> Result<Vec<Deal>, CrmError> {
        let records = collect_pages(self.max_pages, |after| {
            self.list_page::<ObjectRecord<DealProperties>>("deals", DEAL_PROPERTIES, after)
        })
        .await?;

        info!(event_name = "crm.deals.listed", count = records.len(), "crm deals listed");
        Ok(records.into_iter().map(ObjectRecord::into_deal).collect())
    }

    async fn assign_deal(&self, deal_id: &str, contact_id: &str) -> Result<(), CrmError> {
        let request = AssociationRequest::new(deal_id, contact_id)?;
        let url = format!(
            "{}/crm/v3/objects/deals/{}/associations/contacts/{}/{DEAL_TO_CONTACT}",
            self.base_url,
            encode_path_segment(&request.deal_id.0),
            encode_path_segment(&request.contact_id.0),
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|error| transport_error("PUT", &url, error))?;
        ensure_success("PUT", &url, response).await?;

        info!(
            event_name = "crm.deal.assigned",
            deal_id = %request.deal_id,
            contact_id = %request.contact_id,
            "deal associated with contact"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRecord<P> {
    id: String,
    #[serde(default)]
    properties: Option<P>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactProperties {
    firstname: Option<String>,
    lastname: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DealProperties {
    dealname: Option<String>,
    amount: Option<String>,
    dealstage: Option<String>,
}

impl ObjectRecord<ContactProperties> {
    fn into_contact(self) -> Contact {
        let properties = self.properties.unwrap_or_default();
        Contact {
            id: ContactId(self.id),
            first_name: properties.firstname,
            last_name: properties.lastname,
            email: properties.email,
        }
    }
}

impl ObjectRecord<DealProperties> {
    fn into_deal(self) -> Deal {
        let properties = self.properties.unwrap_or_default();
        Deal {
            id: DealId(self.id),
            amount: Deal::parse_amount(properties.amount.as_deref()),
            name: properties.dealname,
            stage: properties.dealstage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HubspotErrorBody {
    message: Option<String>,
}

fn transport_error(method: &'static str, url: &str, error: reqwest::Error) -> CrmError {
    error!(
        event_name = "crm.request.failed",
        method,
        url,
        timeout = error.is_timeout(),
        error = %error,
        "crm request could not be completed"
    );
    CrmError::Transport(error.to_string())
}

async fn ensure_success(
    method: &'static str,
    url: &str,
    response: Response,
) -> Result<Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(
        event_name = "crm.request.failed",
        method,
        url,
        status = status.as_u16(),
        body = %body,
        "crm responded with a non-success status"
    );

    let message = serde_json::from_str::<HubspotErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            }
        });

    Err(CrmError::UpstreamStatus { status: status.as_u16(), message })
}

fn encode_path_segment(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}
