use anyhow::{Context, Result};
use rusqlite::params;

use super::rows::{
    VIDEO_VIEW_COLUMNS, VIDEO_VIEW_FROM, collect_rows, count, like_pattern, row_to_video_view,
};
use super::{Database, new_id, now_timestamp};
use crate::models::{
    NewVideo, Pagination, SortOrder, VideoRecord, VideoSort, VideoUpdate, VideoView,
};

/// Filters for the public video listing.
#[derive(Debug, Clone, Default)]
pub struct VideoQuery {
    pub search: Option<String>,
    pub owner: Option<String>,
    pub sort: VideoSort,
    pub order: SortOrder,
    pub page: Pagination,
}

impl Database {
    pub fn insert_video(&self, new: NewVideo) -> Result<VideoRecord> {
        let now = now_timestamp();
        let video = VideoRecord {
            id: new_id(),
            video_file: new.video_file,
            thumbnail: new.thumbnail,
            title: new.title,
            description: new.description,
            duration: new.duration,
            views: 0,
            is_published: true,
            owner: new.owner,
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO videos (
                    id, video_file, thumbnail, title, description, duration,
                    views, is_published, owner, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7, ?8, ?9)
                "#,
                params![
                    video.id,
                    video.video_file,
                    video.thumbnail,
                    video.title,
                    video.description,
                    video.duration,
                    video.owner,
                    video.created_at,
                    video.updated_at,
                ],
            )
            .context("inserting video")?;
            Ok(())
        })?;

        Ok(video)
    }

    pub fn find_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, video_file, thumbnail, title, description, duration,
                       views, is_published, owner, created_at, updated_at
                FROM videos
                WHERE id = ?1
                "#,
            )?;
            let mut found = collect_rows(&mut stmt, [id], |row| {
                Ok(VideoRecord {
                    id: row.get("id")?,
                    video_file: row.get("video_file")?,
                    thumbnail: row.get("thumbnail")?,
                    title: row.get("title")?,
                    description: row.get("description")?,
                    duration: row.get("duration")?,
                    views: row.get("views")?,
                    is_published: row.get::<_, i64>("is_published")? != 0,
                    owner: row.get("owner")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            })?;
            Ok(found.pop())
        })
    }

    pub fn find_video_view(&self, id: &str) -> Result<Option<VideoView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_VIEW_COLUMNS} {VIDEO_VIEW_FROM} WHERE v.id = ?1"
            ))?;
            let mut found = collect_rows(&mut stmt, [id], row_to_video_view)?;
            Ok(found.pop())
        })
    }

    /// Published videos matching `query`, plus the total before paging.
    pub fn list_videos(&self, query: &VideoQuery) -> Result<(Vec<VideoView>, i64)> {
        let pattern = query.search.as_deref().map(like_pattern);
        self.with_connection(|conn| {
            let filter = r#"
                WHERE v.is_published = 1
                  AND (?1 IS NULL OR v.title LIKE ?1 ESCAPE '\')
                  AND (?2 IS NULL OR v.owner = ?2)
            "#;
            let total = count(
                conn,
                &format!("SELECT COUNT(*) FROM videos v {filter}"),
                params![pattern, query.owner],
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_VIEW_COLUMNS} {VIDEO_VIEW_FROM} {filter} ORDER BY {} {}, v.rowid {} LIMIT ?3 OFFSET ?4",
                query.sort.column(),
                query.order.sql(),
                query.order.sql(),
            ))?;
            let videos = collect_rows(
                &mut stmt,
                params![
                    pattern,
                    query.owner,
                    query.page.limit,
                    query.page.offset()
                ],
                row_to_video_view,
            )?;
            Ok((videos, total))
        })
    }

    pub fn update_video(&self, id: &str, update: &VideoUpdate) -> Result<Option<VideoView>> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE videos
                SET title = COALESCE(?2, title),
                    description = COALESCE(?3, description),
                    thumbnail = COALESCE(?4, thumbnail),
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.title,
                    update.description,
                    update.thumbnail,
                    now_timestamp()
                ],
            )?;
            Ok(())
        })?;
        self.find_video_view(id)
    }

    pub fn set_published(&self, id: &str, published: bool) -> Result<Option<VideoRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE videos SET is_published = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, published, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_video(id)
    }

    /// Counts a view and moves the video to the top of the viewer's history.
    pub fn record_view(&self, video_id: &str, user_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE videos SET views = views + 1 WHERE id = ?1",
                [video_id],
            )?;
            // Re-inserting gives the entry a fresh rowid, which breaks ties
            // between views recorded within the same millisecond.
            tx.execute(
                "DELETE FROM watch_history WHERE user = ?1 AND video = ?2",
                params![user_id, video_id],
            )?;
            tx.execute(
                "INSERT INTO watch_history (user, video, watched_at) VALUES (?1, ?2, ?3)",
                params![user_id, video_id, now_timestamp()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Deletes a video together with its comments, every like on the video
    /// or on those comments, its playlist memberships and history entries.
    pub fn delete_video(&self, id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM likes WHERE comment IN (SELECT id FROM comments WHERE video = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM likes WHERE video = ?1", [id])?;
            tx.execute("DELETE FROM comments WHERE video = ?1", [id])?;
            tx.execute("DELETE FROM playlist_videos WHERE video = ?1", [id])?;
            tx.execute("DELETE FROM watch_history WHERE video = ?1", [id])?;
            let removed = tx.execute("DELETE FROM videos WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}
