//! Verification client error types.

use presence_core::StatusKind;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx answer carrying a message, for calls that have no "no match" outcome.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unreadable response: {0}")]
    Parse(String),
}

impl ClientError {
    pub fn kind(&self) -> StatusKind {
        match self {
            ClientError::Unavailable(_) | ClientError::Network(_) => StatusKind::Network,
            ClientError::Rejected { .. } => StatusKind::Service,
            ClientError::Parse(_) => StatusKind::Parse,
        }
    }

    /// Text shown to the user. Unreadable responses get a generic message.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Parse(_) => "Verification failed".to_string(),
            other => other.to_string(),
        }
    }
}
