use agora_core::CoreError;
use agora_types::api::{ErrorBody, ErrorCode};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            Self::Core(e) => match e {
                CoreError::ChannelNotFound(_)
                | CoreError::ChannelNameNotFound(_)
                | CoreError::MessageNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
                CoreError::InvalidParent(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidParent),
                CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidInput),
                CoreError::AdminOnlyChannel => (StatusCode::FORBIDDEN, ErrorCode::AdminOnlyChannel),
                CoreError::AdminRequired => (StatusCode::FORBIDDEN, ErrorCode::AdminRequired),
                CoreError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Conflict),
            },
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidInput),
            Self::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Storage),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("Request failed: {:#}", self);
        }
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
