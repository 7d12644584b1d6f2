use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use lectern_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// The caller leaves the group. Their read positions in its channels are
/// dropped with the membership, so re-joining starts with everything unread.
pub async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    run_blocking(move || {
        let gid = group_id.to_string();
        if state.db.get_group(&gid).map_err(ApiError::StoreUnavailable)?.is_none() {
            return Err(ApiError::NotFound(format!("group {}", group_id)));
        }

        let removed = state
            .db
            .remove_member(&gid, &user_id.to_string())
            .map_err(ApiError::StoreUnavailable)?;
        if !removed {
            return Err(ApiError::NotAMember(format!(
                "user {} is not a member of group {}",
                user_id, group_id
            )));
        }
        Ok(())
    })
    .await?;

    info!("User {} left group {}", user_id, group_id);
    Ok(StatusCode::NO_CONTENT)
}
