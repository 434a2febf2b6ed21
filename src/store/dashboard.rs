use anyhow::Result;
use rusqlite::params;

use super::Database;
use super::rows::{collect_rows, count};
use super::subscriptions::{SUBSCRIBERS_SELECT, row_to_subscriber};
use crate::models::{ChannelStats, ChannelVideo, Pagination, SortOrder, VideoSort};

const RECENT_SUBSCRIBERS: u32 = 10;

impl Database {
    pub fn channel_stats(&self, owner: &str) -> Result<ChannelStats> {
        self.with_connection(|conn| {
            let (total_videos, total_views): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(views), 0) FROM videos WHERE owner = ?1",
                [owner],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let total_likes = count(
                conn,
                r#"
                SELECT COUNT(*) FROM likes l
                JOIN videos v ON v.id = l.video
                WHERE v.owner = ?1
                "#,
                [owner],
            )?;
            let total_subscribers = count(
                conn,
                "SELECT COUNT(*) FROM subscriptions WHERE channel = ?1",
                [owner],
            )?;
            let mut stmt = conn.prepare(SUBSCRIBERS_SELECT)?;
            let recent_subscribers = collect_rows(
                &mut stmt,
                params![owner, RECENT_SUBSCRIBERS, 0],
                row_to_subscriber,
            )?;

            Ok(ChannelStats {
                total_videos,
                total_views,
                total_likes,
                total_subscribers,
                recent_subscribers,
            })
        })
    }

    /// Every video of `owner`, published or not, with engagement counters.
    pub fn channel_videos(
        &self,
        owner: &str,
        page: Pagination,
        sort: VideoSort,
        order: SortOrder,
    ) -> Result<(Vec<ChannelVideo>, i64)> {
        self.with_connection(|conn| {
            let total = count(conn, "SELECT COUNT(*) FROM videos WHERE owner = ?1", [owner])?;
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT v.id, v.title, v.description, v.thumbnail, v.video_file,
                       v.duration, v.views, v.is_published, v.created_at,
                       (SELECT COUNT(*) FROM likes l WHERE l.video = v.id) AS likes_count,
                       (SELECT COUNT(*) FROM comments c WHERE c.video = v.id) AS comments_count
                FROM videos v
                WHERE v.owner = ?1
                ORDER BY {column} {direction}, v.rowid {direction}
                LIMIT ?2 OFFSET ?3
                "#,
                column = sort.column(),
                direction = order.sql(),
            ))?;
            let videos = collect_rows(
                &mut stmt,
                params![owner, page.limit, page.offset()],
                |row| {
                    Ok(ChannelVideo {
                        id: row.get("id")?,
                        title: row.get("title")?,
                        description: row.get("description")?,
                        thumbnail: row.get("thumbnail")?,
                        video_file: row.get("video_file")?,
                        duration: row.get("duration")?,
                        views: row.get("views")?,
                        is_published: row.get::<_, i64>("is_published")? != 0,
                        created_at: row.get("created_at")?,
                        likes_count: row.get("likes_count")?,
                        comments_count: row.get("comments_count")?,
                    })
                },
            )?;
            Ok((videos, total))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{temp_db, user, video};
    use crate::models::{LikeTarget, Pagination, SortOrder, VideoSort};

    #[test]
    fn stats_roll_up_owner_activity() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        let one = video(&db, &alice, "one");
        let two = video(&db, &alice, "two");
        let elsewhere = video(&db, &bob, "elsewhere");

        db.record_view(&one.id, &bob.id).unwrap();
        db.record_view(&two.id, &bob.id).unwrap();
        db.record_view(&two.id, &carol.id).unwrap();
        db.record_view(&elsewhere.id, &carol.id).unwrap();
        db.toggle_like(&LikeTarget::Video(one.id.clone()), &bob.id)
            .unwrap();
        db.toggle_like(&LikeTarget::Video(one.id.clone()), &carol.id)
            .unwrap();
        db.toggle_like(&LikeTarget::Video(elsewhere.id.clone()), &alice.id)
            .unwrap();
        db.toggle_subscription(&bob.id, &alice.id).unwrap();
        db.toggle_subscription(&carol.id, &alice.id).unwrap();

        let stats = db.channel_stats(&alice.id).unwrap();
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_views, 3);
        assert_eq!(stats.total_likes, 2);
        assert_eq!(stats.total_subscribers, 2);
        assert_eq!(stats.recent_subscribers[0].subscriber.username, "carol");

        let empty = db.channel_stats(&carol.id).unwrap();
        assert_eq!(empty.total_videos, 0);
        assert_eq!(empty.total_views, 0);
        assert!(empty.recent_subscribers.is_empty());
    }

    #[test]
    fn channel_videos_include_unpublished_with_counts() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let public = video(&db, &alice, "public");
        let hidden = video(&db, &alice, "hidden");
        db.set_published(&hidden.id, false).unwrap();
        db.insert_comment(&public.id, &bob.id, "hi").unwrap();
        db.toggle_like(&LikeTarget::Video(public.id.clone()), &bob.id)
            .unwrap();

        let (videos, total) = db
            .channel_videos(&alice.id, Pagination::default(), VideoSort::Title, SortOrder::Asc)
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(videos[0].title, "hidden");
        assert!(!videos[0].is_published);
        assert_eq!(videos[1].likes_count, 1);
        assert_eq!(videos[1].comments_count, 1);
    }
}
