use crate::core::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} rejected login: {reason}")]
    LoginRejected { service: String, reason: String },

    #[error("Unreadable secret for {service}: {message}")]
    Secret { service: String, message: String },
}

impl SetupError {
    /// 給操作者的一行處理建議
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SetupError::Transport(TransportError::Cancelled { .. }) => {
                "The run was cancelled; re-run to converge the remaining steps"
            }
            SetupError::Transport(_) | SetupError::Http(_) => {
                "Check that the containers are running and reachable from this host"
            }
            SetupError::Io(_) => "Check that the stack directory exists and is writable",
            SetupError::Serialization(_) => "The service answered with unexpected JSON; check its version",
            SetupError::Config { .. }
            | SetupError::MissingConfig { .. }
            | SetupError::InvalidConfigValue { .. } => "Fix the stack configuration file and retry",
            SetupError::UnexpectedStatus { .. } => "Inspect the service logs for the rejected request",
            SetupError::LoginRejected { .. } => "Verify the configured username and password",
            SetupError::Secret { .. } => {
                "Start the service once so it writes its config.xml, then re-run setup"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SetupError>;
