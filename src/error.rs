// Error types shared by the API client and the backup workflow.
//
// `ApiError` covers everything that can go wrong talking to Notion;
// `BackupError` is what the workflow surfaces to the binary.

use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Failures of a single call against the Notion API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The session token was rejected (HTTP 401).
    #[error("{endpoint}: credentials rejected (401 Unauthorized)")]
    Unauthorized { endpoint: String },

    /// Any other non-success HTTP status.
    #[error("{endpoint} failed with status {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered but a cookie or field we rely on is missing.
    #[error("unexpected response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },
}

impl ApiError {
    pub(crate) fn malformed(endpoint: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            Self::MalformedResponse { .. } => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Errors that terminate a backup run.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Missing input in non-interactive mode, or an unmet precondition.
    #[error("{0}")]
    Configuration(String),

    /// The selected workspace is not available to this account.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server reported the export task as failed.
    #[error("export task {task_id} failed: {message}")]
    ExportFailed { task_id: String, message: String },

    /// A configured poll timeout elapsed before the export completed.
    #[error("export task {task_id} still running after {waited:?}")]
    ExportTimeout { task_id: String, waited: Duration },

    #[error("interactive prompt error: {0}")]
    Prompt(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file could not be read or written.
    #[error("configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file {path} is not valid: {message}")]
    ConfigFormat { path: PathBuf, message: String },
}

impl BackupError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the underlying cause is a rejected session token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_unauthorized())
    }
}
