/// Failures of a single report run. None are retried; every one aborts the run
/// before or instead of the send.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The task store could not be reached.
    #[error("Store: connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// The aggregation query failed or returned rows of an unexpected shape.
    #[error("Store: aggregation query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// An offline task export could not be read.
    #[error("Source: {0}")]
    Source(String),

    /// The client-credentials token exchange was rejected or malformed.
    #[error("Auth: {0}")]
    Auth(String),

    /// The mail API refused the message.
    #[error("Mail: {0}")]
    Send(String),
}

impl ReportError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Connection(_) => "connection",
            ReportError::Query(_) => "query",
            ReportError::Source(_) => "source",
            ReportError::Auth(_) => "auth",
            ReportError::Send(_) => "send",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config: missing required environment variable(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Config: invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Config: could not load environment file: {0}")]
    EnvFile(String),
}
