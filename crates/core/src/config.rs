use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub access_token: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_pages: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Truncate list results and stash them in session parameters for follow-up turns.
    pub selection_enabled: bool,
    pub selection_limit: usize,
    pub failure_status: FailureStatus,
    pub expose_error_detail: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// HTTP status used when a webhook request fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    Ok,
    ServerError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub crm_access_token: Option<String>,
    pub crm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub selection_enabled: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crm: CrmConfig {
                access_token: String::new().into(),
                base_url: "https://api.hubapi.com".to_string(),
                timeout_secs: 10,
                max_pages: 1000,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            webhook: WebhookConfig {
                selection_enabled: false,
                selection_limit: 5,
                failure_status: FailureStatus::ServerError,
                expose_error_detail: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for FailureStatus {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(Self::Ok),
            "server_error" => Ok(Self::ServerError),
            other => Err(ConfigError::Validation(format!(
                "unsupported webhook failure status `{other}` (expected ok|server_error)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("crmhook.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(access_token_value) = crm.access_token {
                self.crm.access_token = secret_value(access_token_value);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
            if let Some(max_pages) = crm.max_pages {
                self.crm.max_pages = max_pages;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(selection_enabled) = webhook.selection_enabled {
                self.webhook.selection_enabled = selection_enabled;
            }
            if let Some(selection_limit) = webhook.selection_limit {
                self.webhook.selection_limit = selection_limit;
            }
            if let Some(failure_status) = webhook.failure_status {
                self.webhook.failure_status = failure_status;
            }
            if let Some(expose_error_detail) = webhook.expose_error_detail {
                self.webhook.expose_error_detail = expose_error_detail;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let access_token =
            read_env("CRMHOOK_CRM_ACCESS_TOKEN").or_else(|| read_env("HUBSPOT_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("CRMHOOK_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("CRMHOOK_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("CRMHOOK_CRM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CRMHOOK_CRM_MAX_PAGES") {
            self.crm.max_pages = parse_usize("CRMHOOK_CRM_MAX_PAGES", &value)?;
        }

        if let Some(value) = read_env("CRMHOOK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CRMHOOK_SERVER_PORT") {
            self.server.port = parse_u16("CRMHOOK_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("CRMHOOK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CRMHOOK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CRMHOOK_WEBHOOK_SELECTION_ENABLED") {
            self.webhook.selection_enabled =
                parse_bool("CRMHOOK_WEBHOOK_SELECTION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CRMHOOK_WEBHOOK_SELECTION_LIMIT") {
            self.webhook.selection_limit = parse_usize("CRMHOOK_WEBHOOK_SELECTION_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CRMHOOK_WEBHOOK_FAILURE_STATUS") {
            self.webhook.failure_status = value.parse()?;
        }
        if let Some(value) = read_env("CRMHOOK_WEBHOOK_EXPOSE_ERROR_DETAIL") {
            self.webhook.expose_error_detail =
                parse_bool("CRMHOOK_WEBHOOK_EXPOSE_ERROR_DETAIL", &value)?;
        }

        let log_level =
            read_env("CRMHOOK_LOGGING_LEVEL").or_else(|| read_env("CRMHOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CRMHOOK_LOGGING_FORMAT").or_else(|| read_env("CRMHOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(access_token);
        }
        if let Some(base_url) = overrides.crm_base_url {
            self.crm.base_url = base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(selection_enabled) = overrides.selection_enabled {
            self.webhook.selection_enabled = selection_enabled;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_server(&self.server)?;
        validate_webhook(&self.webhook)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("crmhook.toml"), PathBuf::from("config/crmhook.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required. Set CRMHOOK_CRM_ACCESS_TOKEN (or HUBSPOT_ACCESS_TOKEN) to a HubSpot private app token".to_string(),
        ));
    }

    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation("crm.timeout_secs must be in range 1..=300".to_string()));
    }

    if crm.max_pages == 0 {
        return Err(ConfigError::Validation(
            "crm.max_pages must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    if webhook.selection_limit == 0 {
        return Err(ConfigError::Validation(
            "webhook.selection_limit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    server: Option<ServerPatch>,
    webhook: Option<WebhookPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    access_token: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_pages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    selection_enabled: Option<bool>,
    selection_limit: Option<usize>,
    failure_status: Option<FailureStatus>,
    expose_error_detail: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, FailureStatus, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOKEN_VARS: [&str; 2] = ["CRMHOOK_CRM_ACCESS_TOKEN", "HUBSPOT_ACCESS_TOKEN"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("TEST_CRMHOOK_TOKEN", "pat-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("crmhook.toml");
            fs::write(
                &path,
                r#"
[crm]
access_token = "${TEST_CRMHOOK_TOKEN}"
max_pages = 25

[webhook]
selection_enabled = true
failure_status = "ok"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.crm.access_token.expose_secret() == "pat-from-env",
                "access token should be interpolated from environment",
            )?;
            ensure(config.crm.max_pages == 25, "max pages should come from the file")?;
            ensure(config.webhook.selection_enabled, "selection flow should be enabled")?;
            ensure(
                config.webhook.failure_status == FailureStatus::Ok,
                "failure status should be parsed from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CRMHOOK_TOKEN"]);
        result
    }

    #[test]
    fn plain_token_and_port_variables_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-plain");
        env::set_var("PORT", "8088");
        env::set_var("CRMHOOK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.crm.access_token.expose_secret() == "pat-plain",
                "HUBSPOT_ACCESS_TOKEN should provide the access token",
            )?;
            ensure(config.server.port == 8088, "PORT should set the listen port")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HUBSPOT_ACCESS_TOKEN", "PORT", "CRMHOOK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("CRMHOOK_CRM_ACCESS_TOKEN", "pat-from-env");
        env::set_var("CRMHOOK_SERVER_PORT", "4000");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("crmhook.toml");
            fs::write(
                &path,
                r#"
[crm]
access_token = "pat-from-file"
base_url = "http://localhost:9999"

[server]
port = 5000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    crm_base_url: Some("http://127.0.0.1:7777".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.crm.base_url == "http://127.0.0.1:7777",
                "override base url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 4000, "env port should win over file")?;
            ensure(
                config.crm.access_token.expose_secret() == "pat-from-env",
                "env token should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["CRMHOOK_CRM_ACCESS_TOKEN", "CRMHOOK_SERVER_PORT"]);
        result
    }

    #[test]
    fn missing_access_token_aborts_load() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("crm.access_token")
        );
        ensure(has_message, "validation failure should mention crm.access_token")
    }

    #[test]
    fn invalid_port_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("CRMHOOK_CRM_ACCESS_TOKEN", "pat-valid");
        env::set_var("CRMHOOK_SERVER_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid port override to fail".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "CRMHOOK_SERVER_PORT", "error should name the port variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["CRMHOOK_CRM_ACCESS_TOKEN", "CRMHOOK_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("CRMHOOK_CRM_ACCESS_TOKEN", "pat-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("pat-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.webhook.selection_limit == 5, "default selection limit should be 5")?;
            ensure(
                config.webhook.failure_status == FailureStatus::ServerError,
                "failures should default to a server error status",
            )?;
            Ok(())
        })();

        clear_vars(&["CRMHOOK_CRM_ACCESS_TOKEN"]);
        result
    }
}
