use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use roost_db::StoreError;
use roost_db::models::{MessageRow, UserRow};
use roost_types::api::{Claims, MessageResponse, UpdateProfileRequest, UserResponse};

use crate::auth::AppState;
use crate::messages::message_response;
use crate::{parse_sqlite_timestamp, validate};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// Username substring to search for.
    pub q: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let users = state.db.list_users(query.q.as_deref()).map_err(|e| {
        error!("list_users failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(users.into_iter().map(user_response).collect::<Vec<_>>()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_id(&user_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user_response(user)))
}

/// Edit the caller's profile. Absent fields keep their current values; the
/// merged username/email go through the same uniqueness check as signup,
/// excluding the caller's own row.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Response, StatusCode> {
    let user = state
        .db
        .get_user_by_id(&claims.sub.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let username = req.username.unwrap_or_else(|| user.username.clone());
    let email = req.email.unwrap_or_else(|| user.email.clone());
    let image_url = req.image_url.or(user.image_url);
    let header_image_url = req.header_image_url.or(user.header_image_url);
    let bio = req.bio.or(user.bio);
    let location = req.location.or(user.location);

    if username.len() < 3 || username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }

    if let Some(conflict) = validate::check_unique(&state.db, &username, &email, Some(&user.id))
        .map_err(|e| {
            error!("uniqueness check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
    {
        return Ok(validate::conflict_response(conflict));
    }

    match state.db.update_profile(
        &user.id,
        &username,
        &email,
        image_url.as_deref(),
        header_image_url.as_deref(),
        bio.as_deref(),
        location.as_deref(),
    ) {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        // A concurrent edit or signup grabbed the username/email first.
        Err(StoreError::Duplicate) => return Err(StatusCode::CONFLICT),
        Err(e) => {
            error!("update_profile failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let updated = state
        .db
        .get_user_by_id(&user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user_response(updated)).into_response())
}

pub async fn following(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = user_id.to_string();
    require_user(&state, &uid)?;

    let users = state.db.following(&uid).map_err(|e| {
        error!("following query failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(users.into_iter().map(user_response).collect::<Vec<_>>()))
}

pub async fn followers(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = user_id.to_string();
    require_user(&state, &uid)?;

    let users = state.db.followers(&uid).map_err(|e| {
        error!("followers query failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(users.into_iter().map(user_response).collect::<Vec<_>>()))
}

pub async fn user_messages(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = user_id.to_string();
    require_user(&state, &uid)?;

    let rows = state.db.messages_of_user(&uid, 200).map_err(|e| {
        error!("messages_of_user failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(with_like_counts(&state, rows)?))
}

pub async fn user_likes(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = user_id.to_string();
    require_user(&state, &uid)?;

    let rows = state.db.messages_liked_by(&uid, 200).map_err(|e| {
        error!("messages_liked_by failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(with_like_counts(&state, rows)?))
}

fn require_user(state: &AppState, user_id: &str) -> Result<(), StatusCode> {
    state
        .db
        .get_user_by_id(user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(|_| ())
        .ok_or(StatusCode::NOT_FOUND)
}

fn with_like_counts(
    state: &AppState,
    rows: Vec<MessageRow>,
) -> Result<Vec<MessageResponse>, StatusCode> {
    let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let counts: HashMap<String, i64> = state
        .db
        .like_counts_for(&message_ids)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_iter()
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| {
            let like_count = counts.get(&row.id).copied().unwrap_or(0);
            message_response(row, like_count, None)
        })
        .collect())
}

pub(crate) fn user_response(row: UserRow) -> UserResponse {
    UserResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt user id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_sqlite_timestamp(&row.created_at, &format!("user '{}'", row.id)),
        username: row.username,
        image_url: row.image_url,
        header_image_url: row.header_image_url,
        bio: row.bio,
        location: row.location,
    }
}
