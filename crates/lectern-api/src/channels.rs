use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lectern_types::api::{ChannelSummary, Claims, UnreadCountResponse};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// Channel list for a group with the caller's unread count per channel.
pub async fn list_channels(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let counts = run_blocking(move || Ok(state.tracker.unread_counts(user_id, group_id)?)).await?;

    let channels: Vec<ChannelSummary> = counts
        .into_iter()
        .map(|(channel, unread_count)| ChannelSummary {
            id: channel.id,
            group_id: channel.group_id,
            name: channel.name,
            unread_count,
        })
        .collect();

    Ok(Json(channels))
}

/// Move the caller's read position in the channel up to now. Safe to retry.
pub async fn mark_read(
    State(state): State<AppState>,
    Path((group_id, channel_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    run_blocking(move || Ok(state.tracker.mark_read_in(user_id, group_id, channel_id)?)).await?;

    Ok(StatusCode::OK)
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path((group_id, channel_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let (unread_count, position) =
        run_blocking(move || Ok(state.tracker.unread_in(user_id, group_id, channel_id)?)).await?;

    Ok(Json(UnreadCountResponse {
        channel_id,
        unread_count,
        last_read_at: position.map(|p| p.last_read_at),
    }))
}
