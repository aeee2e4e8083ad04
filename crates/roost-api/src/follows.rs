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

pub async fn follow_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // The schema would happily store a self-follow; reject it here.
    if claims.sub == user_id {
        return Err(StatusCode::BAD_REQUEST);
    }

    let target = user_id.to_string();
    if state
        .db
        .get_user_by_id(&target)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    let created = state
        .db
        .follow(&claims.sub.to_string(), &target)
        .map_err(|e| {
            error!("follow failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({ "following": true, "created": created })))
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Removing a missing edge is a no-op, so no existence check.
    let removed = state
        .db
        .unfollow(&claims.sub.to_string(), &user_id.to_string())
        .map_err(|e| {
            error!("unfollow failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({ "following": false, "removed": removed })))
}
