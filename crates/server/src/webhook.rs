//! Conversational-agent fulfillment webhook.
//!
//! The agent posts `{ fulfillmentInfo.tag, sessionInfo.parameters }`; the tag
//! selects a CRM operation and the result is rendered back as plain-text
//! fulfillment messages. Cross-turn state (offered contacts/deals) travels only
//! in the echoed session parameters.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use crmhook_core::config::{FailureStatus, WebhookConfig};
use crmhook_core::crm::CrmApi;
use crmhook_core::errors::WebhookError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use tracing::{error, info};
use uuid::Uuid;

pub const UNRECOGNIZED_MESSAGE: &str = "Sorry, I didn't understand that request.";
pub const MISSING_ASSIGNMENT_MESSAGE: &str =
    "Please provide both a contact and a deal to assign.";
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong while processing your request.";
const NO_CONTACTS_MESSAGE: &str = "No contacts found.";
const NO_DEALS_MESSAGE: &str = "No deals found.";

const CONTACT_ID_PARAM: &str = "contactId";
const DEAL_ID_PARAM: &str = "dealId";
const SELECTED_CONTACT_PARAM: &str = "selectedContact";
const SELECTED_DEAL_PARAM: &str = "selectedDeal";
const CONTACT_OPTIONS_PARAM: &str = "contactOptions";
const DEAL_OPTIONS_PARAM: &str = "dealOptions";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub fulfillment_info: Option<FulfillmentInfo>,
    #[serde(default)]
    pub session_info: Option<SessionInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FulfillmentInfo {
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

/// An envelope that passed shape validation.
#[derive(Clone, Debug, PartialEq)]
pub struct FulfillmentRequest {
    pub tag: String,
    pub session: Option<String>,
    pub parameters: Map<String, Value>,
}

impl WebhookRequest {
    pub fn validate(self) -> Result<FulfillmentRequest, WebhookError> {
        let tag = self
            .fulfillment_info
            .ok_or_else(|| WebhookError::InvalidRequest("missing fulfillmentInfo".to_owned()))?
            .tag
            .unwrap_or_default();
        let session_info = self
            .session_info
            .ok_or_else(|| WebhookError::InvalidRequest("missing sessionInfo".to_owned()))?;

        Ok(FulfillmentRequest {
            tag,
            session: session_info.session,
            parameters: session_info.parameters.unwrap_or_default(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub fulfillment_response: FulfillmentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionParameters>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FulfillmentResponse {
    pub messages: Vec<ResponseMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseMessage {
    pub text: TextMessage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextMessage {
    pub text: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionParameters {
    pub parameters: Map<String, Value>,
}

impl WebhookResponse {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            fulfillment_response: FulfillmentResponse {
                messages: vec![ResponseMessage { text: TextMessage { text: vec![message.into()] } }],
            },
            session_info: None,
        }
    }

    pub fn push_text(mut self, message: impl Into<String>) -> Self {
        self.fulfillment_response
            .messages
            .push(ResponseMessage { text: TextMessage { text: vec![message.into()] } });
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.session_info = Some(SessionParameters { parameters });
        self
    }

    /// Flattened message texts, in order.
    #[cfg(test)]
    pub fn texts(&self) -> Vec<&str> {
        self.fulfillment_response
            .messages
            .iter()
            .flat_map(|message| message.text.text.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    GetContacts,
    GetDeals,
    AssignDeal,
    Unknown(String),
}

impl Intent {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "getContacts" => Self::GetContacts,
            "getDeals" => Self::GetDeals,
            "assignDeal" => Self::AssignDeal,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResponsePolicy {
    pub selection_enabled: bool,
    pub selection_limit: usize,
    pub failure_status: FailureStatus,
    pub expose_error_detail: bool,
}

impl From<&WebhookConfig> for ResponsePolicy {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            selection_enabled: config.selection_enabled,
            selection_limit: config.selection_limit,
            failure_status: config.failure_status,
            expose_error_detail: config.expose_error_detail,
        }
    }
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            selection_enabled: false,
            selection_limit: 5,
            failure_status: FailureStatus::ServerError,
            expose_error_detail: false,
        }
    }
}

/// One side of an assignment, resolved from the session parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Party {
    id: String,
    label: Option<String>,
}

impl Party {
    fn name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

pub struct WebhookDispatcher {
    crm: Arc<dyn CrmApi>,
    policy: ResponsePolicy,
}

impl WebhookDispatcher {
    pub fn new(crm: Arc<dyn CrmApi>, policy: ResponsePolicy) -> Self {
        Self { crm, policy }
    }

    /// Runs a request end to end. Errors never escape: they are logged and
    /// rendered as the generic failure message.
    pub async fn handle(
        &self,
        request: WebhookRequest,
        correlation_id: &str,
    ) -> (StatusCode, WebhookResponse) {
        let outcome = match request.validate() {
            Ok(request) => {
                info!(
                    event_name = "webhook.request.received",
                    correlation_id,
                    tag = %request.tag,
                    session = request.session.as_deref().unwrap_or("unknown"),
                    "webhook request received"
                );
                self.dispatch(request).await
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(response) => (StatusCode::OK, response),
            Err(error) => self.failure(&error, correlation_id),
        }
    }

    pub async fn dispatch(
        &self,
        request: FulfillmentRequest,
    ) -> Result<WebhookResponse, WebhookError> {
        match Intent::from_tag(&request.tag) {
            Intent::GetContacts => self.list_contacts().await,
            Intent::GetDeals => self.list_deals().await,
            Intent::AssignDeal => self.assign_deal(&request.parameters).await,
            Intent::Unknown(tag) => {
                info!(event_name = "webhook.tag.unrecognized", tag = %tag, "unrecognized webhook tag");
                Ok(WebhookResponse::text(UNRECOGNIZED_MESSAGE))
            }
        }
    }

    async fn list_contacts(&self) -> Result<WebhookResponse, WebhookError> {
        let contacts = self.crm.fetch_all_contacts().await?;
        let entries = contacts
            .iter()
            .map(|contact| (contact.id.0.clone(), contact.display_label()))
            .collect::<Vec<_>>();
        Ok(self.render_list(entries, "contacts", NO_CONTACTS_MESSAGE, CONTACT_OPTIONS_PARAM))
    }

    async fn list_deals(&self) -> Result<WebhookResponse, WebhookError> {
        let deals = self.crm.fetch_all_deals().await?;
        let entries = deals
            .iter()
            .map(|deal| (deal.id.0.clone(), deal.display_label()))
            .collect::<Vec<_>>();
        Ok(self.render_list(entries, "deals", NO_DEALS_MESSAGE, DEAL_OPTIONS_PARAM))
    }

    fn render_list(
        &self,
        entries: Vec<(String, String)>,
        noun: &str,
        empty_message: &str,
        options_param: &str,
    ) -> WebhookResponse {
        if entries.is_empty() {
            return WebhookResponse::text(empty_message);
        }

        if !self.policy.selection_enabled {
            let lines = entries.into_iter().map(|(_, label)| label).collect::<Vec<_>>();
            return WebhookResponse::text(lines.join("\n"));
        }

        let total = entries.len();
        let shown = entries.into_iter().take(self.policy.selection_limit).collect::<Vec<_>>();
        let lines = shown
            .iter()
            .enumerate()
            .map(|(index, (_, label))| format!("{}. {label}", index + 1))
            .collect::<Vec<_>>();
        let options = shown
            .iter()
            .map(|(id, label)| json!({ "id": id, "label": label }))
            .collect::<Vec<_>>();

        let mut parameters = Map::new();
        parameters.insert(options_param.to_owned(), Value::Array(options));

        let mut response = WebhookResponse::text(lines.join("\n")).with_parameters(parameters);
        if total > shown.len() {
            response = response.push_text(format!("Showing {} of {total} {noun}.", shown.len()));
        }
        response
    }

    async fn assign_deal(
        &self,
        parameters: &Map<String, Value>,
    ) -> Result<WebhookResponse, WebhookError> {
        let contact =
            resolve_party(parameters, CONTACT_ID_PARAM, SELECTED_CONTACT_PARAM, CONTACT_OPTIONS_PARAM);
        let deal = resolve_party(parameters, DEAL_ID_PARAM, SELECTED_DEAL_PARAM, DEAL_OPTIONS_PARAM);

        let (Some(contact), Some(deal)) = (contact, deal) else {
            return Ok(WebhookResponse::text(MISSING_ASSIGNMENT_MESSAGE));
        };

        self.crm.assign_deal(&deal.id, &contact.id).await?;
        Ok(WebhookResponse::text(format!(
            "Deal {} has been assigned to contact {}.",
            deal.name(),
            contact.name()
        )))
    }

    fn failure(&self, error: &WebhookError, correlation_id: &str) -> (StatusCode, WebhookResponse) {
        let upstream_status = match error {
            WebhookError::Crm(crm) => crm.status(),
            WebhookError::InvalidRequest(_) => None,
        };
        error!(
            event_name = "webhook.request.failed",
            correlation_id,
            error_kind = error.kind().as_str(),
            upstream_status = ?upstream_status,
            error = %error,
            "webhook request failed"
        );

        let message = if self.policy.expose_error_detail {
            format!("{FAILURE_MESSAGE} ({error})")
        } else {
            FAILURE_MESSAGE.to_owned()
        };
        let status = match self.policy.failure_status {
            FailureStatus::Ok => StatusCode::OK,
            FailureStatus::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, WebhookResponse::text(message))
    }
}

/// Direct id parameter first, then a selection: either an object carrying `id`
/// or a 1-based index into the options stashed by an earlier listing.
fn resolve_party(
    parameters: &Map<String, Value>,
    id_param: &str,
    selection_param: &str,
    options_param: &str,
) -> Option<Party> {
    if let Some(id) = parameters.get(id_param).and_then(identifier) {
        return Some(Party { id, label: None });
    }

    match parameters.get(selection_param)? {
        Value::Object(selected) => party_from_object(selected),
        selection => {
            let index = selection_index(selection)?;
            let options = parameters.get(options_param)?.as_array()?;
            let option = options.get(index.checked_sub(1)?)?.as_object()?;
            party_from_object(option)
        }
    }
}

fn party_from_object(object: &Map<String, Value>) -> Option<Party> {
    let id = object.get("id").and_then(identifier)?;
    let label = object
        .get("label")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_owned);
    Some(Party { id, label })
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.trim()).filter(|id| !id.is_empty()).map(str::to_owned),
        Value::Number(number) => whole_number(number).map(|id| id.to_string()),
        _ => None,
    }
}

/// Agents often send integers as floats (`2.0`); fractional or negative values are rejected.
fn whole_number(number: &Number) -> Option<u64> {
    number
        .as_u64()
        .or_else(|| number.as_f64().filter(|n| n.fract() == 0.0 && *n >= 0.0).map(|n| n as u64))
}

fn selection_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => whole_number(number).and_then(|n| usize::try_from(n).ok()),
        Value::String(raw) => raw.trim().parse::<usize>().ok(),
        _ => None,
    }
}

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: Arc<WebhookDispatcher>,
}

pub fn router(crm: Arc<dyn CrmApi>, config: &WebhookConfig) -> Router {
    let dispatcher = WebhookDispatcher::new(crm, ResponsePolicy::from(config));
    Router::new()
        .route("/webhook", post(webhook))
        .with_state(WebhookState { dispatcher: Arc::new(dispatcher) })
}

async fn webhook(
    State(state): State<WebhookState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> (StatusCode, Json<WebhookResponse>) {
    let correlation_id = Uuid::new_v4().to_string();
    let (status, response) = match payload {
        Ok(Json(request)) => state.dispatcher.handle(request, &correlation_id).await,
        Err(rejection) => state.dispatcher.failure(
            &WebhookError::InvalidRequest(rejection.body_text()),
            &correlation_id,
        ),
    };
    (status, Json(response))
}
