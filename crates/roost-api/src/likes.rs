use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use roost_types::api::Claims;

use crate::auth::AppState;

pub async fn like_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let mid = message_id.to_string();
    if state
        .db
        .get_message(&mid)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    let created = state.db.like(&claims.sub.to_string(), &mid).map_err(|e| {
        error!("like failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let like_count = state
        .db
        .like_count(&mid)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({
        "liked": true,
        "created": created,
        "like_count": like_count,
    })))
}

pub async fn unlike_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let mid = message_id.to_string();

    // Removing a missing edge is a no-op, so no existence check.
    let removed = state
        .db
        .unlike(&claims.sub.to_string(), &mid)
        .map_err(|e| {
            error!("unlike failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let like_count = state
        .db
        .like_count(&mid)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({
        "liked": false,
        "removed": removed,
        "like_count": like_count,
    })))
}
