//! SQLite persistence for every VideoTube entity.
//!
//! [`Database`] is a cheap, cloneable handle holding only the file path. Each
//! operation opens its own connection, so callers can move a handle into
//! `spawn_blocking` without sharing a connection across threads. Schema setup
//! happens once in [`Database::open`].
//!
//! Referential integrity is enforced here rather than through SQLite foreign
//! keys: deleting a parent runs the dependent deletes in the same
//! transaction. Like and subscription rows carry unique indexes so a lost
//! toggle race fails instead of duplicating the relationship.

mod comments;
mod dashboard;
mod likes;
mod playlists;
mod rows;
mod subscriptions;
mod tweets;
mod users;
mod videos;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rand_core::{OsRng, RngCore};
use rusqlite::Connection;

pub use videos::VideoQuery;

#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Opens (and if necessary creates) the database file and ensures the
    /// schema exists. WAL mode keeps readers from blocking the writer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("setting synchronous mode")?;
        ensure_tables(&mut conn)?;

        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = Connection::open(&self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        f(&mut conn)
    }
}

/// Creates every table and index inside one transaction so a failure leaves
/// the file untouched.
fn ensure_tables(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            avatar TEXT NOT NULL,
            cover_image TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            refresh_token TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            video_file TEXT NOT NULL,
            thumbnail TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            duration REAL NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 1,
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_videos_owner ON videos(owner);

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            video TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video);

        CREATE TABLE IF NOT EXISTS tweets (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tweets_owner ON tweets(owner);

        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists(owner);

        CREATE TABLE IF NOT EXISTS playlist_videos (
            playlist TEXT NOT NULL,
            video TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (playlist, video)
        );
        CREATE INDEX IF NOT EXISTS idx_playlist_videos_video ON playlist_videos(video);

        CREATE TABLE IF NOT EXISTS likes (
            id TEXT PRIMARY KEY,
            video TEXT,
            comment TEXT,
            tweet TEXT,
            liked_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            CHECK ((video IS NOT NULL) + (comment IS NOT NULL) + (tweet IS NOT NULL) = 1)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_likes_video
            ON likes(liked_by, video) WHERE video IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS uq_likes_comment
            ON likes(liked_by, comment) WHERE comment IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS uq_likes_tweet
            ON likes(liked_by, tweet) WHERE tweet IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_likes_video ON likes(video);
        CREATE INDEX IF NOT EXISTS idx_likes_comment ON likes(comment);
        CREATE INDEX IF NOT EXISTS idx_likes_tweet ON likes(tweet);

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            subscriber TEXT NOT NULL,
            channel TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (subscriber, channel)
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel ON subscriptions(channel);

        CREATE TABLE IF NOT EXISTS watch_history (
            user TEXT NOT NULL,
            video TEXT NOT NULL,
            watched_at TEXT NOT NULL,
            PRIMARY KEY (user, video)
        );
        "#,
    )?;

    tx.commit()?;
    Ok(())
}

/// Generates a 24 character hex id: 4 bytes of unix time followed by 8
/// random bytes, so ids sort roughly by creation.
pub fn new_id() -> String {
    let mut bytes = [0u8; 12];
    let secs = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    OsRng.fill_bytes(&mut bytes[4..]);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Accepts exactly the shape produced by [`new_id`]: 24 lowercase hex digits.
pub fn is_valid_id(value: &str) -> bool {
    value.len() == 24
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// True when `err` comes from a write that hit a UNIQUE index, such as two
/// registrations racing for the same username.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>()
        .and_then(rusqlite::Error::sqlite_error_code)
        .is_some_and(|code| code == rusqlite::ErrorCode::ConstraintViolation)
}

/// RFC 3339 UTC timestamp with millisecond precision; sorts lexically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{NewUser, NewVideo, UserRecord, VideoRecord};
    use tempfile::TempDir;

    pub fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    pub fn user(db: &Database, name: &str) -> UserRecord {
        db.insert_user(NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            full_name: format!("{name} tester"),
            avatar: format!("/media/{name}.png"),
            cover_image: String::new(),
            password_hash: "hash".into(),
        })
        .unwrap()
    }

    pub fn video(db: &Database, owner: &UserRecord, title: &str) -> VideoRecord {
        db.insert_video(NewVideo {
            title: title.to_string(),
            description: format!("about {title}"),
            video_file: format!("/media/{title}.mp4"),
            thumbnail: format!("/media/{title}.png"),
            duration: 12.5,
            owner: owner.id.clone(),
        })
        .unwrap()
    }
}
