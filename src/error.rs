//! Error types for the bridge.

use thiserror::Error;

use crate::translate::openai_types::ChatErrorResponse;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Conversion error: {message}")]
    Conversion { message: String },

    #[error("Remote API returned status {status}: {body}")]
    RemoteApi { status: u16, body: String },

    #[error("Stream read error: {message}")]
    StreamRead { message: String },

    #[error("Remote response contained no choices")]
    EmptyChoice,

    #[error("Sink rejected response: {message}")]
    Sink { message: String },

    #[error("Call cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion {
            message: msg.into(),
        }
    }

    pub fn stream_read(msg: impl Into<String>) -> Self {
        Self::StreamRead {
            message: msg.into(),
        }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink {
            message: msg.into(),
        }
    }

    /// The provider's own `error.message` when a remote error body is an
    /// OpenAI error envelope, otherwise the raw body.
    pub fn remote_message(&self) -> Option<String> {
        match self {
            Self::RemoteApi { body, .. } => Some(
                serde_json::from_str::<ChatErrorResponse>(body)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| body.clone()),
            ),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
