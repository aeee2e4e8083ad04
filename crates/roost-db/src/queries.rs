use crate::models::{MessageRow, UserRow};
use crate::{Database, StoreError};
use rusqlite::{Connection, Row};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        image_url: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, image_url) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, email, password_hash, image_url],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, username, email, password, image_url, header_image_url, bio, location, created_at
                 FROM users WHERE id = ?1",
            )?
            .query_row([id], user_from_row)
            .optional()
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, username, email, password, image_url, header_image_url, bio, location, created_at
                 FROM users WHERE username = ?1",
            )?
            .query_row([username], user_from_row)
            .optional()
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, username, email, password, image_url, header_image_url, bio, location, created_at
                 FROM users WHERE email = ?1",
            )?
            .query_row([email], user_from_row)
            .optional()
        })
    }

    /// List users, optionally filtered by a username substring (the search page).
    pub fn list_users(&self, q: Option<&str>) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| match q {
            Some(q) => collect_users(
                conn,
                "SELECT id, username, email, password, image_url, header_image_url, bio, location, created_at
                 FROM users WHERE username LIKE '%' || ?1 || '%' ORDER BY username",
                [q],
            ),
            None => collect_users(
                conn,
                "SELECT id, username, email, password, image_url, header_image_url, bio, location, created_at
                 FROM users ORDER BY username",
                rusqlite::params![],
            ),
        })
    }

    /// Returns false when no such user exists.
    pub fn update_profile(
        &self,
        id: &str,
        username: &str,
        email: &str,
        image_url: Option<&str>,
        header_image_url: Option<&str>,
        bio: Option<&str>,
        location: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET username = ?2, email = ?3, image_url = ?4, header_image_url = ?5, bio = ?6, location = ?7
                 WHERE id = ?1",
                rusqlite::params![id, username, email, image_url, header_image_url, bio, location],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, id: &str, user_id: &str, text: &str) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, text) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, user_id, text],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT m.id, m.user_id, u.username, m.text, m.created_at
                 FROM messages m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.id = ?1",
            )?
            .query_row([id], message_from_row)
            .optional()
        })
    }

    pub fn messages_of_user(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            collect_messages(
                conn,
                "SELECT m.id, m.user_id, u.username, m.text, m.created_at
                 FROM messages m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.user_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2",
                rusqlite::params![user_id, limit],
            )
        })
    }

    /// Home timeline: newest-first messages by the user and everyone they
    /// follow. Pass the `created_at` of the oldest message from the previous
    /// page as `before` to fetch older messages.
    pub fn timeline(
        &self,
        user_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            collect_messages(
                conn,
                "SELECT m.id, m.user_id, u.username, m.text, m.created_at
                 FROM messages m
                 JOIN users u ON u.id = m.user_id
                 WHERE (m.user_id = ?1
                        OR m.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1))
                   AND (?2 IS NULL OR m.created_at < ?2)
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?3",
                rusqlite::params![user_id, before, limit],
            )
        })
    }

    // -- Follows --

    /// Create the (follower -> followed) edge. The composite primary key
    /// makes a repeated follow a no-op rather than a second edge.
    /// Returns whether a new edge was created.
    pub fn follow(&self, follower_id: &str, followed_id: &str) -> Result<bool, StoreError> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?1, ?2)",
                [follower_id, followed_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove the edge if present. Removing a missing edge is a no-op.
    /// Returns whether an edge existed.
    pub fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<bool, StoreError> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                [follower_id, followed_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_following(&self, follower_id: &str, followed_id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                [follower_id, followed_id],
                |row| row.get(0),
            )?;
            Ok(exists != 0)
        })
    }

    pub fn is_followed_by(&self, user_id: &str, other_id: &str) -> Result<bool, StoreError> {
        self.is_following(other_id, user_id)
    }

    /// Users this user follows, most recent follow first.
    pub fn following(&self, user_id: &str) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            collect_users(
                conn,
                "SELECT u.id, u.username, u.email, u.password, u.image_url, u.header_image_url, u.bio, u.location, u.created_at
                 FROM users u
                 JOIN follows f ON u.id = f.followed_id
                 WHERE f.follower_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC",
                [user_id],
            )
        })
    }

    /// Users following this user, most recent follow first.
    pub fn followers(&self, user_id: &str) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            collect_users(
                conn,
                "SELECT u.id, u.username, u.email, u.password, u.image_url, u.header_image_url, u.bio, u.location, u.created_at
                 FROM users u
                 JOIN follows f ON u.id = f.follower_id
                 WHERE f.followed_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC",
                [user_id],
            )
        })
    }

    // -- Likes --

    /// Create the (user, message) edge; liking twice leaves a single edge.
    /// Returns whether a new edge was created.
    pub fn like(&self, user_id: &str, message_id: &str) -> Result<bool, StoreError> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO likes (user_id, message_id) VALUES (?1, ?2)",
                [user_id, message_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove the edge if present. Removing a missing edge is a no-op.
    pub fn unlike(&self, user_id: &str, message_id: &str) -> Result<bool, StoreError> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                [user_id, message_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn like_count(&self, message_id: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE message_id = ?1",
                [message_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Batch-fetch like counts for a set of message IDs (avoids N+1 on lists).
    pub fn like_counts_for(&self, message_ids: &[String]) -> Result<Vec<(String, i64)>, StoreError> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, COUNT(*) FROM likes WHERE message_id IN ({}) GROUP BY message_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn message_ids_liked_by(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT message_id FROM likes WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Messages this user liked, most recent like first.
    pub fn messages_liked_by(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            collect_messages(
                conn,
                "SELECT m.id, m.user_id, u.username, m.text, m.created_at
                 FROM messages m
                 JOIN users u ON u.id = m.user_id
                 JOIN likes l ON l.message_id = m.id
                 WHERE l.user_id = ?1
                 ORDER BY l.created_at DESC, l.rowid DESC
                 LIMIT ?2",
                rusqlite::params![user_id, limit],
            )
        })
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        image_url: row.get(4)?,
        header_image_url: row.get(5)?,
        bio: row.get(6)?,
        location: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn collect_users<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<UserRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn collect_messages<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MessageRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
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
    fn new_user_has_no_messages_or_followers() {
        let db = seeded_db();
        assert!(db.messages_of_user("u1", 50).unwrap().is_empty());
        assert!(db.followers("u1").unwrap().is_empty());
        assert!(db.following("u1").unwrap().is_empty());
    }

    #[test]
    fn follow_is_directed() {
        let db = seeded_db();
        assert!(db.follow("u1", "u2").unwrap());

        assert!(db.is_following("u1", "u2").unwrap());
        assert!(db.is_followed_by("u2", "u1").unwrap());
        assert!(!db.is_following("u2", "u1").unwrap());
        assert!(!db.is_followed_by("u1", "u2").unwrap());
    }

    #[test]
    fn double_follow_leaves_one_edge() {
        let db = seeded_db();
        assert!(db.follow("u1", "u2").unwrap());
        assert!(!db.follow("u1", "u2").unwrap());

        assert_eq!(db.followers("u2").unwrap().len(), 1);
        assert_eq!(db.following("u1").unwrap().len(), 1);
    }

    #[test]
    fn unfollow_missing_edge_is_a_noop() {
        let db = seeded_db();
        assert!(!db.unfollow("u1", "u2").unwrap());

        db.follow("u1", "u2").unwrap();
        assert!(db.unfollow("u1", "u2").unwrap());
        assert!(!db.is_following("u1", "u2").unwrap());
    }

    #[test]
    fn double_like_leaves_one_edge() {
        let db = seeded_db();
        db.insert_message("m1", "u1", "test message 1").unwrap();

        assert!(db.like("u2", "m1").unwrap());
        assert!(!db.like("u2", "m1").unwrap());

        assert_eq!(db.like_count("m1").unwrap(), 1);
        assert_eq!(db.message_ids_liked_by("u2").unwrap(), vec!["m1".to_string()]);
    }

    #[test]
    fn unlike_missing_edge_is_a_noop() {
        let db = seeded_db();
        db.insert_message("m1", "u1", "test message 1").unwrap();

        assert!(!db.unlike("u2", "m1").unwrap());

        db.like("u2", "m1").unwrap();
        assert!(db.unlike("u2", "m1").unwrap());
        assert_eq!(db.like_count("m1").unwrap(), 0);
    }

    #[test]
    fn duplicate_username_is_a_store_conflict() {
        let db = seeded_db();
        let err = db
            .create_user("u3", "testuser1", "new@test.com", "X", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[test]
    fn duplicate_email_is_a_store_conflict() {
        let db = seeded_db();
        let err = db
            .create_user("u3", "testuser3", "test1@test.com", "X", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[test]
    fn timeline_shows_own_and_followed_messages_newest_first() {
        let db = seeded_db();
        db.create_user("u3", "testuser3", "test3@test.com", "X", None)
            .unwrap();

        db.insert_message("m1", "u2", "from followed").unwrap();
        db.insert_message("m2", "u1", "own message").unwrap();
        db.insert_message("m3", "u3", "from a stranger").unwrap();
        db.follow("u1", "u2").unwrap();

        let ids: Vec<String> = db
            .timeline("u1", 50, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m2".to_string(), "m1".to_string()]);
    }

    #[test]
    fn profile_update_changes_fields() {
        let db = seeded_db();
        assert!(db
            .update_profile(
                "u1",
                "testuser1",
                "test1@test.com",
                Some("/img.png"),
                None,
                Some("hello"),
                Some("nowhere"),
            )
            .unwrap());

        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.image_url.as_deref(), Some("/img.png"));
        assert_eq!(user.bio.as_deref(), Some("hello"));

        assert!(!db
            .update_profile("missing", "x", "x@test.com", None, None, None, None)
            .unwrap());
    }

    #[test]
    fn user_search_matches_substring() {
        let db = seeded_db();
        db.create_user("u3", "somebody", "else@test.com", "X", None)
            .unwrap();

        let all = db.list_users(None).unwrap();
        assert_eq!(all.len(), 3);

        let hits: Vec<String> = db
            .list_users(Some("test"))
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(hits, vec!["testuser1".to_string(), "testuser2".to_string()]);
    }
}
