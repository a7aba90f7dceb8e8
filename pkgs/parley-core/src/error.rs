//! Error types for engine operations

use parley_store::StoreError;
use thiserror::Error;

/// Errors reported by the chat engine
///
/// Every variant is recoverable: it is returned to the immediate caller and
/// never tears down the connection or the process.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(_)
            | StoreError::GroupNotFound(_)
            | StoreError::ContactNotFound { .. } => ChatError::NotFound(err.to_string()),
            StoreError::NotPermitted(reason) => ChatError::PermissionDenied(reason),
            StoreError::InvalidInput(reason) => ChatError::InvalidArgument(reason),
            StoreError::ContactExists { .. } | StoreError::AlreadyMember { .. } => {
                ChatError::InvalidState(err.to_string())
            }
            other => ChatError::Storage(other),
        }
    }
}

impl ChatError {
    /// Stable machine-readable code reported alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::PermissionDenied(_) => "PERMISSION_DENIED",
            ChatError::InvalidState(_) => "INVALID_STATE",
            ChatError::Unauthenticated(_) => "UNAUTHENTICATED",
            ChatError::Storage(_) => "STORAGE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
