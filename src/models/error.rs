use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::StoreError;

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn reply(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
        (status, Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.into(),
        }))
    }
}

/// Which class of failure a [`SyncError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Protocol,
    Authorization,
    Persistence,
    Connection,
}

/// Failures surfaced to a single client while handling its messages.
///
/// None of these close the connection except [`SyncError::ConnectionClosed`],
/// and none of them leak to other clients.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("invalid '{kind}' payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("not joined to room '{0}'")]
    NotInRoom(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("connection closed")]
    ConnectionClosed,
}

impl SyncError {
    /// Wire `code` reported in the `error` payload.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::MalformedMessage(_) => "invalid_message",
            SyncError::UnknownMessageType(_) => "unknown_message_type",
            SyncError::InvalidPayload { .. } => "invalid_payload",
            SyncError::DocumentNotFound(_) => "document_not_found",
            SyncError::NotInRoom(_) => "not_in_room",
            SyncError::Persistence(_) => "persistence_error",
            SyncError::ConnectionClosed => "connection_closed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::MalformedMessage(_)
            | SyncError::UnknownMessageType(_)
            | SyncError::InvalidPayload { .. } => ErrorCategory::Protocol,
            SyncError::DocumentNotFound(_) | SyncError::NotInRoom(_) => ErrorCategory::Authorization,
            SyncError::Persistence(_) => ErrorCategory::Persistence,
            SyncError::ConnectionClosed => ErrorCategory::Connection,
        }
    }

    /// Message shown to the client. Store internals are not disclosed.
    pub fn client_message(&self) -> String {
        match self {
            SyncError::Persistence(_) => "The document could not be saved, no changes were applied".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_categories_follow_taxonomy() {
        let unknown = SyncError::UnknownMessageType("shout".into());
        assert_eq!(unknown.code(), "unknown_message_type");
        assert_eq!(unknown.category(), ErrorCategory::Protocol);

        let missing = SyncError::DocumentNotFound("note-1".into());
        assert_eq!(missing.code(), "document_not_found");
        assert_eq!(missing.category(), ErrorCategory::Authorization);

        let store = SyncError::from(StoreError::Unavailable("down".into()));
        assert_eq!(store.code(), "persistence_error");
        assert_eq!(store.category(), ErrorCategory::Persistence);
        assert!(!store.client_message().contains("down"));
    }
}
