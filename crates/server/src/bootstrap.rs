use std::sync::Arc;

use axum::Router;
use crmhook_core::config::{AppConfig, ConfigError};
use crmhook_core::crm::CrmApi;
use thiserror::Error;
use tracing::info;

use crate::hubspot::HubspotClient;
use crate::{health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub crm: Arc<dyn CrmApi>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crm http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let crm = HubspotClient::new(&config.crm).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.crm_client_ready",
        correlation_id = "bootstrap",
        base_url = %config.crm.base_url,
        timeout_secs = config.crm.timeout_secs,
        max_pages = config.crm.max_pages,
        "crm client initialized"
    );

    Ok(Application { config, crm: Arc::new(crm) })
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(webhook::router(self.crm.clone(), &self.config.webhook))
            .merge(health::router())
    }
}
