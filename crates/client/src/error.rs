//! Error surface for every runtime intent.
//!
//! Nothing below the intent boundary panics or escapes as an untyped error:
//! transport, decode, validation and server failures all become a
//! `ClientError` with a message suitable for display.

use thiserror::Error;

/// Broad failure category, used by presenters to pick wording and by the
/// controller to decide what state to leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
    Validation,
    Server,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Could not read server response: {0}")]
    Decode(String),

    #[error("{0}")]
    Server(String),

    #[error("Malformed completion frame: {0}")]
    MalformedCompletion(String),

    #[error("The response stream ended before the reply was complete")]
    StreamInterrupted,
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Validation(_) | ClientError::Unauthenticated => ErrorKind::Validation,
            ClientError::Transport(_)
            | ClientError::MalformedCompletion(_)
            | ClientError::StreamInterrupted => ErrorKind::Transport,
            ClientError::Decode(_) => ErrorKind::Decode,
            ClientError::Http { .. } | ClientError::Server(_) => ErrorKind::Server,
        }
    }

    /// Text shown to the user. Server-supplied messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Http { status: 404, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
