use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Collaborator,
    InvalidState,
}

/// User-visible failure published to the UI. Stale responses and geolocation
/// denial never produce one.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Collaborator, message)
    }
}
