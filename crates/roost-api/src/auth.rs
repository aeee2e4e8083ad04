use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::error;
use uuid::Uuid;

use roost_db::{Database, StoreError, models::UserRow};
use roost_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::validate;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

/// Hash a plaintext password with Argon2id and a fresh salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;

    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, plain: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Return the user only if the username exists and the password matches its
/// stored hash. Unknown username and wrong password are indistinguishable to
/// the caller.
pub fn authenticate(
    db: &Database,
    username: &str,
    password: &str,
) -> Result<Option<UserRow>, StoreError> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    if verify_password(&user.password, password) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, StatusCode> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !req.email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }

    if let Some(conflict) =
        validate::check_unique(&state.db, &req.username, &req.email, None).map_err(|e| {
            error!("uniqueness check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
    {
        return Ok(validate::conflict_response(conflict));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("{}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user_id = Uuid::new_v4();

    match state.db.create_user(
        &user_id.to_string(),
        &req.username,
        &req.email,
        &password_hash,
        req.image_url.as_deref(),
    ) {
        Ok(()) => {}
        // Lost a race with a concurrent signup; the store's constraint is
        // the referee. Retryable.
        Err(StoreError::Duplicate) => return Err(StatusCode::CONFLICT),
        Err(e) => {
            error!("create_user failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let token = create_token(&state.jwt_secret, user_id, &req.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = authenticate(&state.db, &req.username, &req.password)
        .map_err(|e| {
            error!("login query failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_is_never_the_plaintext() {
        let hash = hash_password("password123").unwrap();
        assert_ne!(hash, "password123");
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_the_right_password_only() {
        let hash = hash_password("password123").unwrap();
        assert!(verify_password(&hash, "password123"));
        assert!(!verify_password(&hash, "wrong_password"));
        assert!(!verify_password("not a phc string", "password123"));
    }

    #[test]
    fn authenticate_matches_only_the_right_credentials() {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("password123").unwrap();
        db.create_user("u1", "testuser1", "test1@test.com", &hash, None)
            .unwrap();

        let user = authenticate(&db, "testuser1", "password123").unwrap();
        assert_eq!(user.unwrap().username, "testuser1");

        // Wrong password and unknown username both come back as no match.
        assert!(authenticate(&db, "testuser1", "wrong_password").unwrap().is_none());
        assert!(authenticate(&db, "nottestuser1", "password123").unwrap().is_none());
    }
}
