use agora_core::{NewMessage, Window};
use agora_types::api::{Claims, MessageResponse, SendMessageRequest};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Case-insensitive substring filter on content.
    pub query: Option<String>,
    /// Cursor-based pagination: pass the id of the oldest message of the
    /// previous page to fetch older messages.
    pub before: Option<Uuid>,
}

fn default_limit() -> usize {
    50
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(params): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let window = Window {
        limit: Some(params.limit),
        query: params.query,
        before: params.before,
    };

    let page = state.hub.messages(channel_id, &window)?;
    let messages = page
        .into_iter()
        .map(|(message, reactions)| MessageResponse::new(message, reactions))
        .collect();

    Ok(Json(messages))
}

/// Single message lookup, e.g. a thread parent outside the client's window.
pub async fn get_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (message, reactions) = state.hub.message(channel_id, message_id)?;
    Ok(Json(MessageResponse::new(message, reactions)))
}

/// Permissions are evaluated inside the hub on every append.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewMessage {
        attachment: req.attachment(),
        content: req.content,
        parent_id: req.parent_id,
        nonce: req.nonce,
    };

    let message = state.hub.post_message(channel_id, &claims.author(), new)?;
    debug!(
        "{} posted {} in {} (reply: {})",
        claims.username,
        message.id,
        channel_id,
        message.parent_id.is_some()
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(message, Default::default())),
    ))
}
