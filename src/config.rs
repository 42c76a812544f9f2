use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_SENDER: &str = "support@applywizz.com";
pub const DEFAULT_APP_NAME: &str = "Task Management";
pub const DEFAULT_DASHBOARD_URL: &str = "https://dashboard.apply-wizz.com/";
pub const DEFAULT_SCORE_THRESHOLD: f64 = 75.0;
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const REQUIRED: [&str; 4] = [
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_ID",
    "AZURE_CLIENT_SECRET",
    "DATABASE_URL",
];

#[derive(Clone)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"••••")
            .finish()
    }
}

/// Everything a report run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub credentials: AzureCredentials,
    pub database_url: String,
    pub sender: String,
    pub recipient: String,
    pub cc: Vec<String>,
    pub score_threshold: f64,
    pub app_name: String,
    pub dashboard_url: String,
    pub http_timeout: Duration,
    pub authority_host: String,
    pub graph_base: String,
}

impl ReportConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<&'static str> = REQUIRED
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(vec![key]));

        let score_threshold = match get("SCORE_THRESHOLD") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| ConfigError::Invalid {
                    var: "SCORE_THRESHOLD",
                    reason: format!("expected a number, got '{raw}'"),
                })?,
            None => DEFAULT_SCORE_THRESHOLD,
        };

        let timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "HTTP_TIMEOUT_SECS",
                    reason: format!("expected a positive number of seconds, got '{raw}'"),
                })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let sender = get("SENDER_EMAIL").unwrap_or_else(|| DEFAULT_SENDER.to_string());
        let recipient = get("REPORT_RECIPIENT").unwrap_or_else(|| sender.clone());

        Ok(Self {
            credentials: AzureCredentials {
                tenant_id: required("AZURE_TENANT_ID")?,
                client_id: required("AZURE_CLIENT_ID")?,
                client_secret: required("AZURE_CLIENT_SECRET")?,
            },
            database_url: required("DATABASE_URL")?,
            sender,
            recipient,
            cc: get("CC_EMAIL_RECIPIENTS")
                .map(|raw| parse_cc_list(&raw))
                .unwrap_or_default(),
            score_threshold,
            app_name: get("REPORT_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            dashboard_url: get("DASHBOARD_URL")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
            authority_host: base_url(get("AZURE_AUTHORITY_HOST"), DEFAULT_AUTHORITY_HOST),
            graph_base: base_url(get("GRAPH_API_BASE"), DEFAULT_GRAPH_BASE),
        })
    }
}

/// Loads `KEY=value` lines into the process environment without overriding
/// variables that are already set. With no explicit path a missing `./.env`
/// is not an error.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|e| ConfigError::EnvFile(format!("{}: {e}", path.display()))),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(ConfigError::EnvFile(e.to_string())),
        },
    }
}

pub fn parse_cc_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
