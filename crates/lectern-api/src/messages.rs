use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use lectern_db::timestamp;
use lectern_types::api::{Claims, MessageResponse, SendMessageRequest};
use lectern_types::models::Message;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

pub const MAX_BODY_CHARS: usize = 4000;
const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the `created_at` and `id` of the oldest
    /// message from the previous page to fetch older messages.
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

fn validate_body(body: &str) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::Validation("message body is empty".into()));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::Validation(format!(
            "message body exceeds {} characters",
            MAX_BODY_CHARS
        )));
    }
    Ok(())
}

fn validate_cursor(query: &MessageQuery) -> Result<(), ApiError> {
    if query.before_id.is_some() && query.before.is_none() {
        return Err(ApiError::Validation("before_id requires before".into()));
    }
    if query.before.as_ref().is_some_and(|at| !timestamp::in_range(at)) {
        return Err(ApiError::Validation("before is out of range".into()));
    }
    Ok(())
}

fn to_response(message: Message) -> MessageResponse {
    MessageResponse {
        id: message.id,
        channel_id: message.channel_id,
        author_id: message.author_id,
        body: message.body,
        created_at: message.created_at,
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path((group_id, channel_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_body(&req.body)?;

    let user_id = claims.sub;
    let message_id = Uuid::new_v4();
    let now = Utc::now();

    let body = req.body.clone();
    run_blocking(move || {
        state.tracker.member_channel_in(user_id, group_id, channel_id)?;
        state
            .db
            .insert_message(
                &message_id.to_string(),
                &channel_id.to_string(),
                &user_id.to_string(),
                &body,
                now,
            )
            .map_err(ApiError::StoreUnavailable)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            channel_id,
            author_id: user_id,
            body: req.body,
            created_at: now,
        }),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path((group_id, channel_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    validate_cursor(&query)?;

    let user_id = claims.sub;
    let limit = query.limit.min(MAX_PAGE);
    let before = query.before;
    let before_id = query.before_id.map(|id| id.to_string());

    let rows = run_blocking(move || {
        state.tracker.member_channel_in(user_id, group_id, channel_id)?;
        state
            .db
            .get_messages(&channel_id.to_string(), limit, before, before_id.as_deref())
            .map_err(ApiError::StoreUnavailable)
    })
    .await?;

    let messages = rows
        .into_iter()
        .map(|row| Message::try_from(row).map(to_response))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ApiError::StoreUnavailable)?;

    Ok(Json(messages))
}

/// Soft-delete one of the caller's own messages. The row stays, so read
/// positions and history ordering are unaffected.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((group_id, channel_id, message_id)): Path<(Uuid, Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    run_blocking(move || {
        state.tracker.member_channel_in(user_id, group_id, channel_id)?;

        let not_found = || ApiError::NotFound(format!("message {}", message_id));
        let row = state
            .db
            .get_message(&message_id.to_string())
            .map_err(ApiError::StoreUnavailable)?
            .ok_or_else(not_found)?;
        let message = Message::try_from(row).map_err(ApiError::StoreUnavailable)?;

        if message.channel_id != channel_id || message.deleted_at.is_some() {
            return Err(not_found());
        }
        if message.author_id != user_id {
            return Err(ApiError::Forbidden("only the author can delete a message".into()));
        }

        if !state
            .db
            .soft_delete_message(&message_id.to_string(), Utc::now())
            .map_err(ApiError::StoreUnavailable)?
        {
            return Err(not_found());
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
