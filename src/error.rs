use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TodoError {
    /// HTTP transport failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API error (code {code}): {message}")]
    Api { code: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API answered with something that cannot become local state
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session storage error: {0}")]
    Session(#[from] std::io::Error),
}

impl TodoError {
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        TodoError::Api {
            code: status.as_u16(),
            message: message.into(),
        }
    }

    /// Check if the server rejected the session token
    pub fn is_auth_error(&self) -> bool {
        matches!(self, TodoError::Api { code: 401 | 403, .. })
    }

    /// Message the server supplied, if any. Used for the inline form errors.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            TodoError::Api { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TodoError>;
