use agora_core::{ChannelSummary, NewChannel};
use agora_types::api::{ChannelResponse, Claims, CreateChannelRequest};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub query: Option<String>,
}

fn to_response(summary: ChannelSummary) -> ChannelResponse {
    ChannelResponse::new(&summary.channel, summary.thread_count, summary.message_count)
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(params): Query<ChannelQuery>,
    Extension(_claims): Extension<Claims>,
) -> Json<Vec<ChannelResponse>> {
    let channels = state
        .hub
        .list_channels(params.query.as_deref())
        .into_iter()
        .map(to_response)
        .collect();
    Json(channels)
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<ChannelResponse>, ApiError> {
    Ok(Json(to_response(state.hub.channel(channel_id)?)))
}

/// Admin only. Channels are provisioned out-of-band in normal operation;
/// this is the administrative entry point for doing so.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.hub.create_channel(
        &claims.author(),
        NewChannel {
            name: req.name,
            title: req.title,
            description: req.description,
            is_admin_only: req.is_admin_only,
            position: req.position,
        },
    )?;

    Ok((StatusCode::CREATED, Json(to_response(summary))))
}
