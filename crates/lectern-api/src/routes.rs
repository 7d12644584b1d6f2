use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{channels, members, messages};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/groups/{group_id}/channels", get(channels::list_channels))
        .route("/groups/{group_id}/channels/{channel_id}/mark-read", post(channels::mark_read))
        .route("/groups/{group_id}/channels/{channel_id}/unread", get(channels::unread_count))
        .route(
            "/groups/{group_id}/channels/{channel_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/groups/{group_id}/channels/{channel_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route("/groups/{group_id}/members/me", delete(members::leave_group))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
