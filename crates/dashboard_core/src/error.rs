use shared::{
    domain::{Coordinate, IncidentId},
    error::{ErrorKind, ErrorNotice},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("coordinate must be finite, got {0}")]
    NonFiniteCoordinate(Coordinate),
    #[error("horizon must be between 1 and {max} hours, got {hours}")]
    InvalidHorizon { hours: u32, max: u32 },
    #[error("unknown incident {0}")]
    UnknownIncident(IncidentId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat query is empty")]
    EmptyQuery,
    #[error("a chat request is already in flight")]
    Busy,
    #[error("reply for request {request_id} arrived after the session moved on")]
    Stale { request_id: u64 },
}

#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("cannot {action} while emergency flow is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("failed to generate emergency draft: {0}")]
    Draft(String),
    #[error("failed to dispatch emergency alert: {0}")]
    Dispatch(String),
    #[error("emergency draft arrived after the flow moved on")]
    Stale,
}

#[derive(Debug, Error)]
pub enum VoiceLinkError {
    #[error("voice link is already active")]
    AlreadyActive,
    #[error("voice link is not active")]
    NotActive,
    #[error("failed to connect voice channel: {0}")]
    Connect(String),
    #[error("voice link was stopped while connecting")]
    Superseded,
    #[error("failed to send audio: {0}")]
    Send(String),
}

impl From<&EmergencyError> for ErrorNotice {
    fn from(value: &EmergencyError) -> Self {
        let kind = match value {
            EmergencyError::InvalidTransition { .. } | EmergencyError::Stale => {
                ErrorKind::InvalidState
            }
            EmergencyError::Draft(_) | EmergencyError::Dispatch(_) => ErrorKind::Collaborator,
        };
        ErrorNotice::new(kind, value.to_string())
    }
}

impl From<&VoiceLinkError> for ErrorNotice {
    fn from(value: &VoiceLinkError) -> Self {
        let kind = match value {
            VoiceLinkError::AlreadyActive
            | VoiceLinkError::NotActive
            | VoiceLinkError::Superseded => ErrorKind::InvalidState,
            VoiceLinkError::Connect(_) | VoiceLinkError::Send(_) => ErrorKind::Collaborator,
        };
        ErrorNotice::new(kind, value.to_string())
    }
}
