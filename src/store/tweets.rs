use anyhow::{Context, Result};
use rusqlite::params;

use super::rows::{collect_rows, count, owner_from};
use super::{Database, new_id, now_timestamp};
use crate::models::{Pagination, TweetRecord, TweetView};

impl Database {
    pub fn insert_tweet(&self, owner: &str, content: &str) -> Result<TweetRecord> {
        let now = now_timestamp();
        let tweet = TweetRecord {
            id: new_id(),
            content: content.to_string(),
            owner: owner.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO tweets (id, content, owner, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tweet.id,
                    tweet.content,
                    tweet.owner,
                    tweet.created_at,
                    tweet.updated_at
                ],
            )
            .context("inserting tweet")?;
            Ok(())
        })?;

        Ok(tweet)
    }

    pub fn find_tweet(&self, id: &str) -> Result<Option<TweetRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, owner, created_at, updated_at FROM tweets WHERE id = ?1",
            )?;
            let mut found = collect_rows(&mut stmt, [id], |row| {
                Ok(TweetRecord {
                    id: row.get("id")?,
                    content: row.get("content")?,
                    owner: row.get("owner")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            })?;
            Ok(found.pop())
        })
    }

    /// Tweets of `owner`, newest first, plus the owner's total.
    pub fn user_tweets(&self, owner: &str, page: Pagination) -> Result<(Vec<TweetView>, i64)> {
        self.with_connection(|conn| {
            let total = count(conn, "SELECT COUNT(*) FROM tweets WHERE owner = ?1", [owner])?;
            let mut stmt = conn.prepare(
                r#"
                SELECT t.id, t.content, t.created_at, t.updated_at,
                       u.id AS owner_id, u.username AS owner_username,
                       u.full_name AS owner_full_name, u.avatar AS owner_avatar,
                       (SELECT COUNT(*) FROM likes l WHERE l.tweet = t.id) AS likes_count
                FROM tweets t
                JOIN users u ON u.id = t.owner
                WHERE t.owner = ?1
                ORDER BY t.created_at DESC, t.rowid DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let tweets = collect_rows(&mut stmt, params![owner, page.limit, page.offset()], |row| {
                Ok(TweetView {
                    id: row.get("id")?,
                    content: row.get("content")?,
                    owner: owner_from(row, "owner")?,
                    likes_count: row.get("likes_count")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            })?;
            Ok((tweets, total))
        })
    }

    pub fn update_tweet(&self, id: &str, content: &str) -> Result<Option<TweetRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_tweet(id)
    }

    pub fn delete_tweet(&self, id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM likes WHERE tweet = ?1", [id])?;
            let removed = tx.execute("DELETE FROM tweets WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{temp_db, user};
    use crate::models::{LikeTarget, Pagination};

    #[test]
    fn user_tweets_are_newest_first_and_scoped() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.insert_tweet(&alice.id, "one").unwrap();
        let two = db.insert_tweet(&alice.id, "two").unwrap();
        db.insert_tweet(&bob.id, "elsewhere").unwrap();
        db.toggle_like(&LikeTarget::Tweet(two.id.clone()), &bob.id)
            .unwrap();

        let (tweets, total) = db.user_tweets(&alice.id, Pagination::default()).unwrap();
        assert_eq!(total, 2);
        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].content, "two");
        assert_eq!(tweets[0].likes_count, 1);
        assert_eq!(tweets[1].owner.username, "alice");
    }

    #[test]
    fn delete_removes_likes() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let tweet = db.insert_tweet(&alice.id, "short lived").unwrap();
        db.toggle_like(&LikeTarget::Tweet(tweet.id.clone()), &alice.id)
            .unwrap();

        let edited = db.update_tweet(&tweet.id, "edited").unwrap().unwrap();
        assert_eq!(edited.content, "edited");

        assert!(db.delete_tweet(&tweet.id).unwrap());
        assert!(db.find_tweet(&tweet.id).unwrap().is_none());
        assert_eq!(db.like_count(&LikeTarget::Tweet(tweet.id)).unwrap(), 0);
    }
}
