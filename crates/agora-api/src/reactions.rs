use agora_types::api::{Claims, ReactionQuery, ReactionResponse};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<ReactionQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let users = state
        .hub
        .toggle_reaction(channel_id, message_id, claims.sub, &params.emoji)?;

    Ok(Json(ReactionResponse {
        emoji: params.emoji,
        count: users.len(),
        user_ids: users.into_iter().collect(),
    }))
}
