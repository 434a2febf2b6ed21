use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::rows::{
    USER_COLUMNS, VIDEO_VIEW_COLUMNS, VIDEO_VIEW_FROM, collect_rows, row_to_user, row_to_video_view,
};
use super::{Database, new_id, now_timestamp};
use crate::models::{ChannelProfile, NewUser, UserCredentials, UserRecord, VideoView};

impl Database {
    pub fn insert_user(&self, new: NewUser) -> Result<UserRecord> {
        let now = now_timestamp();
        let user = UserRecord {
            id: new_id(),
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            avatar: new.avatar,
            cover_image: new.cover_image,
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO users (
                    id, username, email, full_name, avatar, cover_image,
                    password_hash, refresh_token, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)
                "#,
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.full_name,
                    user.avatar,
                    user.cover_image,
                    new.password_hash,
                    user.created_at,
                    user.updated_at,
                ],
            )
            .context("inserting user")?;
            Ok(())
        })?;

        Ok(user)
    }

    pub fn find_user(&self, id: &str) -> Result<Option<UserRecord>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
            let mut users = collect_rows(&mut stmt, [id], row_to_user)?;
            Ok(users.pop())
        })
    }

    /// True when another account already uses `username` or `email`.
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                    params![username, email],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn email_taken_by_other(&self, email: &str, user_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE email = ?1 AND id <> ?2 LIMIT 1",
                    params![email, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Looks a user up by username or email, whichever is supplied.
    pub fn find_credentials_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserCredentials>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {USER_COLUMNS}, password_hash, refresh_token
                FROM users
                WHERE (?1 IS NOT NULL AND username = ?1)
                   OR (?2 IS NOT NULL AND email = ?2)
                LIMIT 1
                "#
            ))?;
            let mut found = collect_rows(&mut stmt, params![username, email], row_to_credentials)?;
            Ok(found.pop())
        })
    }

    pub fn find_credentials(&self, id: &str) -> Result<Option<UserCredentials>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS}, password_hash, refresh_token FROM users WHERE id = ?1"
            ))?;
            let mut found = collect_rows(&mut stmt, [id], row_to_credentials)?;
            Ok(found.pop())
        })
    }

    /// Replaces (or with `None`, clears) the single valid refresh token.
    pub fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
                params![user_id, token],
            )?;
            Ok(())
        })
    }

    /// Stores a new password hash and drops the refresh token so existing
    /// sessions cannot be renewed.
    pub fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE users
                SET password_hash = ?2, refresh_token = NULL, updated_at = ?3
                WHERE id = ?1
                "#,
                params![user_id, hash, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn update_account(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<Option<UserRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE users SET full_name = ?2, email = ?3, updated_at = ?4 WHERE id = ?1",
                params![user_id, full_name, email, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_user(user_id)
    }

    pub fn update_avatar(&self, user_id: &str, url: &str) -> Result<Option<UserRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, url, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_user(user_id)
    }

    pub fn update_cover_image(&self, user_id: &str, url: &str) -> Result<Option<UserRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE users SET cover_image = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, url, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_user(user_id)
    }

    /// Public channel page for `username`, with subscription counters and
    /// whether `viewer` (if any) subscribes to it.
    pub fn channel_profile(
        &self,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Option<ChannelProfile>> {
        self.with_connection(|conn| {
            let profile = conn
                .query_row(
                    r#"
                    SELECT u.id, u.full_name, u.username, u.avatar, u.cover_image,
                           u.email, u.created_at,
                           (SELECT COUNT(*) FROM subscriptions s WHERE s.channel = u.id),
                           (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber = u.id),
                           EXISTS (
                               SELECT 1 FROM subscriptions s
                               WHERE s.channel = u.id AND s.subscriber = ?2
                           )
                    FROM users u
                    WHERE u.username = ?1
                    "#,
                    params![username, viewer],
                    |row| {
                        Ok(ChannelProfile {
                            id: row.get(0)?,
                            full_name: row.get(1)?,
                            username: row.get(2)?,
                            avatar: row.get(3)?,
                            cover_image: row.get(4)?,
                            email: row.get(5)?,
                            created_at: row.get(6)?,
                            subscribers_count: row.get(7)?,
                            channels_subscribed_to_count: row.get(8)?,
                            is_subscribed: row.get::<_, i64>(9)? != 0,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
    }

    /// Videos the user watched, most recent first. Videos unpublished since
    /// are skipped unless the user owns them.
    pub fn watch_history(&self, user_id: &str) -> Result<Vec<VideoView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {VIDEO_VIEW_COLUMNS}
                {VIDEO_VIEW_FROM}
                JOIN watch_history h ON h.video = v.id
                WHERE h.user = ?1
                  AND (v.is_published = 1 OR v.owner = ?1)
                ORDER BY h.watched_at DESC, h.rowid DESC
                "#
            ))?;
            collect_rows(&mut stmt, [user_id], row_to_video_view)
        })
    }
}

fn row_to_credentials(row: &rusqlite::Row<'_>) -> Result<UserCredentials> {
    Ok(UserCredentials {
        user: row_to_user(row)?,
        password_hash: row.get("password_hash")?,
        refresh_token: row.get("refresh_token")?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{temp_db, user, video};

    #[test]
    fn insert_then_lookup_by_login() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");

        let by_name = db
            .find_credentials_by_login(Some("alice"), None)
            .unwrap()
            .unwrap();
        assert_eq!(by_name.user, alice);
        assert_eq!(by_name.password_hash, "hash");
        assert!(by_name.refresh_token.is_none());

        let by_email = db
            .find_credentials_by_login(None, Some("alice@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.user.id, alice.id);

        assert!(db.find_credentials_by_login(None, None).unwrap().is_none());
    }

    #[test]
    fn user_exists_checks_both_keys() {
        let (_dir, db) = temp_db();
        user(&db, "alice");
        assert!(db.user_exists("alice", "other@example.com").unwrap());
        assert!(db.user_exists("other", "alice@example.com").unwrap());
        assert!(!db.user_exists("bob", "bob@example.com").unwrap());
    }

    #[test]
    fn refresh_token_is_replaced_and_cleared() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        db.set_refresh_token(&alice.id, Some("one")).unwrap();
        db.set_refresh_token(&alice.id, Some("two")).unwrap();
        let creds = db.find_credentials(&alice.id).unwrap().unwrap();
        assert_eq!(creds.refresh_token.as_deref(), Some("two"));

        db.set_refresh_token(&alice.id, None).unwrap();
        let creds = db.find_credentials(&alice.id).unwrap().unwrap();
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn password_change_revokes_refresh_token() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        db.set_refresh_token(&alice.id, Some("live")).unwrap();
        db.set_password_hash(&alice.id, "new-hash").unwrap();
        let creds = db.find_credentials(&alice.id).unwrap().unwrap();
        assert_eq!(creds.password_hash, "new-hash");
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn channel_profile_counts_subscriptions() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.toggle_subscription(&bob.id, &alice.id).unwrap();

        let seen_by_bob = db.channel_profile("alice", Some(&bob.id)).unwrap().unwrap();
        assert_eq!(seen_by_bob.subscribers_count, 1);
        assert_eq!(seen_by_bob.channels_subscribed_to_count, 0);
        assert!(seen_by_bob.is_subscribed);

        let seen_by_guest = db.channel_profile("alice", None).unwrap().unwrap();
        assert!(!seen_by_guest.is_subscribed);

        assert!(db.channel_profile("nobody", None).unwrap().is_none());
    }

    #[test]
    fn watch_history_orders_most_recent_first() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let first = video(&db, &alice, "first");
        let second = video(&db, &alice, "second");

        db.record_view(&first.id, &alice.id).unwrap();
        db.record_view(&second.id, &alice.id).unwrap();
        db.record_view(&first.id, &alice.id).unwrap();

        let history = db.watch_history(&alice.id).unwrap();
        let ids: Vec<_> = history.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(history[0].views, 2);
    }

    #[test]
    fn watch_history_hides_videos_unpublished_by_others() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let clip = video(&db, &alice, "clip");
        db.record_view(&clip.id, &alice.id).unwrap();
        db.record_view(&clip.id, &bob.id).unwrap();
        db.set_published(&clip.id, false).unwrap();

        assert!(db.watch_history(&bob.id).unwrap().is_empty());
        assert_eq!(db.watch_history(&alice.id).unwrap().len(), 1);
    }
}
