use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use roost_db::models::MessageRow;
use roost_types::api::{Claims, MessageResponse, PostMessageRequest};

use crate::auth::AppState;
use crate::parse_sqlite_timestamp;

/// Messages are short posts.
const MAX_TEXT_CHARS: usize = 140;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Trim and bound-check message text. None means reject.
pub(crate) fn clean_text(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TEXT_CHARS {
        None
    } else {
        Some(trimmed)
    }
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(text) = clean_text(&req.text) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let message_id = Uuid::new_v4();

    state
        .db
        .insert_message(&message_id.to_string(), &claims.sub.to_string(), text)
        .map_err(|e| {
            error!("insert_message failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            user_id: claims.sub,
            username: claims.username.clone(),
            text: text.to_string(),
            created_at: chrono::Utc::now(),
            like_count: 0,
            liked_by_me: None,
        }),
    ))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_message(&message_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let like_count = state
        .db
        .like_count(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(message_response(row, like_count, None)))
}

/// Home timeline: the caller's own messages plus those of everyone they
/// follow, newest first.
pub async fn timeline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TimelineQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB queries off the async runtime
    let db = state.clone();
    let uid = claims.sub.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let (rows, counts, liked) = tokio::task::spawn_blocking(move || {
        let rows = db
            .db
            .timeline(&uid, limit, before.as_deref())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let counts = db
            .db
            .like_counts_for(&message_ids)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let liked = db
            .db
            .message_ids_liked_by(&uid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((rows, counts, liked))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    let counts: HashMap<String, i64> = counts.into_iter().collect();
    let liked: HashSet<String> = liked.into_iter().collect();

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let like_count = counts.get(&row.id).copied().unwrap_or(0);
            let liked_by_me = Some(liked.contains(&row.id));
            message_response(row, like_count, liked_by_me)
        })
        .collect();

    Ok(Json(messages))
}

pub(crate) fn message_response(
    row: MessageRow,
    like_count: i64,
    liked_by_me: Option<bool>,
) -> MessageResponse {
    MessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        user_id: row.user_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt user_id '{}' on message '{}': {}", row.user_id, row.id, e);
            Uuid::default()
        }),
        created_at: parse_sqlite_timestamp(&row.created_at, &format!("message '{}'", row.id)),
        username: row.username,
        text: row.text,
        like_count,
        liked_by_me,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(clean_text("  hello  "), Some("hello"));
        assert_eq!(clean_text(""), None);
        assert_eq!(clean_text("   \n "), None);

        let at_limit = "x".repeat(140);
        assert_eq!(clean_text(&at_limit), Some(at_limit.as_str()));
        assert_eq!(clean_text(&"x".repeat(141)), None);
    }
}
