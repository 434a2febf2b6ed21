use anyhow::{Context, Result};
use rusqlite::params;

use super::rows::{collect_rows, count, owner_from};
use super::{Database, new_id, now_timestamp};
use crate::models::{CommentRecord, CommentView, Pagination};

impl Database {
    pub fn insert_comment(&self, video_id: &str, owner: &str, content: &str) -> Result<CommentRecord> {
        let now = now_timestamp();
        let comment = CommentRecord {
            id: new_id(),
            content: content.to_string(),
            video: video_id.to_string(),
            owner: owner.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO comments (id, content, video, owner, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    comment.id,
                    comment.content,
                    comment.video,
                    comment.owner,
                    comment.created_at,
                    comment.updated_at,
                ],
            )
            .context("inserting comment")?;
            Ok(())
        })?;

        Ok(comment)
    }

    pub fn find_comment(&self, id: &str) -> Result<Option<CommentRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, video, owner, created_at, updated_at FROM comments WHERE id = ?1",
            )?;
            let mut found = collect_rows(&mut stmt, [id], |row| {
                Ok(CommentRecord {
                    id: row.get("id")?,
                    content: row.get("content")?,
                    video: row.get("video")?,
                    owner: row.get("owner")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            })?;
            Ok(found.pop())
        })
    }

    /// Comments on a video, newest first, each with its author and like count.
    pub fn list_comments(
        &self,
        video_id: &str,
        page: Pagination,
    ) -> Result<(Vec<CommentView>, i64)> {
        self.with_connection(|conn| {
            let total = count(
                conn,
                "SELECT COUNT(*) FROM comments WHERE video = ?1",
                [video_id],
            )?;
            let mut stmt = conn.prepare(
                r#"
                SELECT c.id, c.content, c.video, c.created_at, c.updated_at,
                       u.id AS owner_id, u.username AS owner_username,
                       u.full_name AS owner_full_name, u.avatar AS owner_avatar,
                       (SELECT COUNT(*) FROM likes l WHERE l.comment = c.id) AS likes_count
                FROM comments c
                JOIN users u ON u.id = c.owner
                WHERE c.video = ?1
                ORDER BY c.created_at DESC, c.rowid DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let comments = collect_rows(
                &mut stmt,
                params![video_id, page.limit, page.offset()],
                |row| {
                    Ok(CommentView {
                        id: row.get("id")?,
                        content: row.get("content")?,
                        video: row.get("video")?,
                        owner: owner_from(row, "owner")?,
                        likes_count: row.get("likes_count")?,
                        created_at: row.get("created_at")?,
                        updated_at: row.get("updated_at")?,
                    })
                },
            )?;
            Ok((comments, total))
        })
    }

    pub fn update_comment(&self, id: &str, content: &str) -> Result<Option<CommentRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_comment(id)
    }

    /// Removes a comment and the likes pointing at it.
    pub fn delete_comment(&self, id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM likes WHERE comment = ?1", [id])?;
            let removed = tx.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{temp_db, user, video};
    use crate::models::{LikeTarget, Pagination};

    #[test]
    fn list_returns_newest_first_with_like_counts() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let clip = video(&db, &alice, "clip");

        let older = db.insert_comment(&clip.id, &alice.id, "first!").unwrap();
        let newer = db.insert_comment(&clip.id, &bob.id, "second").unwrap();
        db.toggle_like(&LikeTarget::Comment(older.id.clone()), &bob.id)
            .unwrap();

        let (comments, total) = db.list_comments(&clip.id, Pagination::default()).unwrap();
        assert_eq!(total, 2);
        assert_eq!(comments[0].id, newer.id);
        assert_eq!(comments[0].owner.username, "bob");
        assert_eq!(comments[1].likes_count, 1);

        let (page_two, _) = db
            .list_comments(&clip.id, Pagination::new(Some(2), Some(1)))
            .unwrap();
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].id, older.id);
    }

    #[test]
    fn update_and_delete() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let clip = video(&db, &alice, "clip");
        let comment = db.insert_comment(&clip.id, &alice.id, "typo").unwrap();
        db.toggle_like(&LikeTarget::Comment(comment.id.clone()), &alice.id)
            .unwrap();

        let edited = db.update_comment(&comment.id, "fixed").unwrap().unwrap();
        assert_eq!(edited.content, "fixed");

        assert!(db.delete_comment(&comment.id).unwrap());
        assert!(db.find_comment(&comment.id).unwrap().is_none());
        assert_eq!(db.like_count(&LikeTarget::Comment(comment.id)).unwrap(), 0);
    }
}
