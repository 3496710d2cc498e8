pub mod auth;
pub mod blobs;
pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::services::ServeDir;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Build the full HTTP surface. Everything except `/health` and stored
/// files requires a bearer token.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    let protected_routes = Router::new()
        .route(
            "/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/channels/upload",
            post(blobs::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            get(messages::get_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected_routes);

    if let Some(root) = state.blobs.local_root() {
        app = app.nest_service("/files", ServeDir::new(root));
    }

    app.with_state(state)
}
