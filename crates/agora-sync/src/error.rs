use agora_core::CoreError;
use agora_types::api::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Why a coordinator operation failed. Write failures are surfaced to the
/// caller as-is; the coordinator never retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parent: {0}")]
    InvalidParent(String),

    #[error("{0}")]
    AdminOnlyChannel(String),

    #[error("{0}")]
    AdminRequired(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("server unavailable: {0}")]
    Transient(String),

    #[error("view is closed")]
    Closed,
}

impl SyncError {
    /// Network and storage hiccups, as opposed to the server refusing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn from_body(body: ErrorBody) -> Self {
        match body.code {
            ErrorCode::NotFound => Self::NotFound(body.message),
            ErrorCode::InvalidParent => Self::InvalidParent(body.message),
            ErrorCode::AdminOnlyChannel => Self::AdminOnlyChannel(body.message),
            ErrorCode::AdminRequired => Self::AdminRequired(body.message),
            ErrorCode::InvalidInput | ErrorCode::Conflict => Self::Rejected(body.message),
            ErrorCode::Unauthorized => Self::Unauthorized,
            ErrorCode::Storage => Self::Transient(body.message),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        let message = e.to_string();
        match e {
            CoreError::ChannelNotFound(_)
            | CoreError::ChannelNameNotFound(_)
            | CoreError::MessageNotFound(_) => Self::NotFound(message),
            CoreError::InvalidParent(_) => Self::InvalidParent(message),
            CoreError::AdminOnlyChannel => Self::AdminOnlyChannel(message),
            CoreError::AdminRequired => Self::AdminRequired(message),
            CoreError::Conflict(_) | CoreError::InvalidInput(_) => Self::Rejected(message),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}
