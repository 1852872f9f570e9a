//! Error taxonomy for the assistant core.
//!
//! Routing misses, unresolved time phrases and stale history indices are
//! ordinary outcomes and never show up here. These variants cover faults that
//! escape a component and get turned into a spoken apology by the assistant
//! loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport failure or timeout talking to a remote service.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the remote model.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("speech engine error: {0}")]
    Speech(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Network(format!("cannot connect: {e}"))
        } else if e.is_timeout() {
            Self::Network(format!("request timed out: {e}"))
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
