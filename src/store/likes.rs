use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use super::rows::{VIDEO_VIEW_COLUMNS, VIDEO_VIEW_FROM, collect_rows, count, row_to_video_view};
use super::{Database, new_id, now_timestamp};
use crate::models::{LikeTarget, LikeToggle, LikedVideo, Pagination};

impl Database {
    /// Flips the like `user_id` holds on `target` and returns the new state
    /// with the refreshed counter, all inside one transaction.
    pub fn toggle_like(&self, target: &LikeTarget, user_id: &str) -> Result<LikeToggle> {
        let column = target.column();
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    &format!("SELECT id FROM likes WHERE {column} = ?1 AND liked_by = ?2"),
                    params![target.id(), user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let liked = match existing {
                Some(id) => {
                    tx.execute("DELETE FROM likes WHERE id = ?1", [id])?;
                    false
                }
                None => {
                    tx.execute(
                        &format!(
                            "INSERT INTO likes (id, {column}, liked_by, created_at) VALUES (?1, ?2, ?3, ?4)"
                        ),
                        params![new_id(), target.id(), user_id, now_timestamp()],
                    )?;
                    true
                }
            };

            let likes_count = count_for(&tx, target)?;
            tx.commit()?;
            Ok(LikeToggle { liked, likes_count })
        })
    }

    pub fn like_count(&self, target: &LikeTarget) -> Result<i64> {
        self.with_connection(|conn| count_for(conn, target))
    }

    /// Videos the user liked, most recently liked first. Videos their owner
    /// has since unpublished drop out.
    pub fn liked_videos(
        &self,
        user_id: &str,
        page: Pagination,
    ) -> Result<(Vec<LikedVideo>, i64)> {
        self.with_connection(|conn| {
            let total = count(
                conn,
                r#"
                SELECT COUNT(*) FROM likes l
                JOIN videos v ON v.id = l.video
                WHERE l.liked_by = ?1
                  AND (v.is_published = 1 OR v.owner = ?1)
                "#,
                [user_id],
            )?;
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {VIDEO_VIEW_COLUMNS},
                       l.id AS like_id, l.created_at AS liked_at
                {VIDEO_VIEW_FROM}
                JOIN likes l ON l.video = v.id
                WHERE l.liked_by = ?1
                  AND (v.is_published = 1 OR v.owner = ?1)
                ORDER BY l.created_at DESC, l.rowid DESC
                LIMIT ?2 OFFSET ?3
                "#
            ))?;
            let liked = collect_rows(
                &mut stmt,
                params![user_id, page.limit, page.offset()],
                |row| {
                    let details = row_to_video_view(row)?;
                    Ok(LikedVideo {
                        id: row.get("like_id")?,
                        video: details.id.clone(),
                        created_at: row.get("liked_at")?,
                        video_details: details,
                    })
                },
            )?;
            Ok((liked, total))
        })
    }
}

fn count_for(conn: &Connection, target: &LikeTarget) -> Result<i64> {
    count(
        conn,
        &format!("SELECT COUNT(*) FROM likes WHERE {} = ?1", target.column()),
        [target.id()],
    )
}
