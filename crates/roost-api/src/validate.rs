use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use roost_db::{Database, StoreError};

/// Outcome of the signup/profile-edit uniqueness check. At most one conflict
/// is reported per call; the username check takes priority over email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquenessConflict {
    UsernameTaken,
    EmailInUse,
}

impl UniquenessConflict {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UsernameTaken => "Username already taken, try a different username",
            Self::EmailInUse => "Email already in use",
        }
    }
}

/// Check whether the candidate username or email collides with an existing,
/// *different* user. `exclude_id` is `None` for brand-new signups and the
/// user's own id for profile edits, so keeping your current username/email
/// passes.
///
/// Best-effort only: a concurrent duplicate that slips through is caught by
/// the store's UNIQUE constraints and surfaced as `StoreError::Duplicate`.
pub fn check_unique(
    db: &Database,
    username: &str,
    email: &str,
    exclude_id: Option<&str>,
) -> Result<Option<UniquenessConflict>, StoreError> {
    if let Some(existing) = db.get_user_by_username(username)? {
        if exclude_id != Some(existing.id.as_str()) {
            return Ok(Some(UniquenessConflict::UsernameTaken));
        }
    }

    if let Some(existing) = db.get_user_by_email(email)? {
        if exclude_id != Some(existing.id.as_str()) {
            return Ok(Some(UniquenessConflict::EmailInUse));
        }
    }

    Ok(None)
}

pub(crate) fn conflict_response(conflict: UniquenessConflict) -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({ "error": conflict.message() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "testuser1", "test1@test.com", "HASHED_PASSWORD1", None)
            .unwrap();
        db.create_user("u2", "testuser2", "test2@test.com", "HASHED_PASSWORD2", None)
            .unwrap();
        db
    }

    #[test]
    fn username_collision_with_another_user_conflicts() {
        let db = seeded_db();
        let conflict = check_unique(&db, "testuser1", "new@test.com", Some("u2"))
            .unwrap()
            .unwrap();
        assert_eq!(conflict, UniquenessConflict::UsernameTaken);
        assert_eq!(
            conflict.message(),
            "Username already taken, try a different username"
        );
    }

    #[test]
    fn own_row_is_excluded_when_editing_profile() {
        let db = seeded_db();
        assert_eq!(
            check_unique(&db, "testuser1", "test1@test.com", Some("u1")).unwrap(),
            None
        );
    }

    #[test]
    fn email_collision_conflicts() {
        let db = seeded_db();
        let conflict = check_unique(&db, "brandnew", "test2@test.com", None)
            .unwrap()
            .unwrap();
        assert_eq!(conflict, UniquenessConflict::EmailInUse);
        assert_eq!(conflict.message(), "Email already in use");
    }

    #[test]
    fn username_check_takes_priority_when_both_collide() {
        let db = seeded_db();
        let conflict = check_unique(&db, "testuser1", "test1@test.com", None)
            .unwrap()
            .unwrap();
        assert_eq!(conflict, UniquenessConflict::UsernameTaken);
    }

    #[test]
    fn fresh_username_and_email_pass() {
        let db = seeded_db();
        assert_eq!(
            check_unique(&db, "testuser3", "test3@test.com", None).unwrap(),
            None
        );
    }
}
