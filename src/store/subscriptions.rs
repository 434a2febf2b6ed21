use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::rows::{collect_rows, count, owner_from};
use super::{Database, new_id, now_timestamp};
use crate::models::{Pagination, SubscribedChannel, SubscriberEntry, SubscriptionToggle};

/// Subscriber summaries for a channel, newest first. Shared with the
/// dashboard, which shows the most recent ones.
pub(super) const SUBSCRIBERS_SELECT: &str = r#"
    SELECT s.id, s.channel, s.created_at,
           u.id AS subscriber_id, u.username AS subscriber_username,
           u.full_name AS subscriber_full_name, u.avatar AS subscriber_avatar
    FROM subscriptions s
    JOIN users u ON u.id = s.subscriber
    WHERE s.channel = ?1
    ORDER BY s.created_at DESC, s.rowid DESC
    LIMIT ?2 OFFSET ?3
"#;

pub(super) fn row_to_subscriber(row: &rusqlite::Row<'_>) -> Result<SubscriberEntry> {
    Ok(SubscriberEntry {
        id: row.get("id")?,
        subscriber: owner_from(row, "subscriber")?,
        channel: row.get("channel")?,
        created_at: row.get("created_at")?,
    })
}

impl Database {
    /// Subscribes `subscriber` to `channel`, or unsubscribes when already
    /// subscribed.
    pub fn toggle_subscription(
        &self,
        subscriber: &str,
        channel: &str,
    ) -> Result<SubscriptionToggle> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM subscriptions WHERE subscriber = ?1 AND channel = ?2",
                    params![subscriber, channel],
                    |row| row.get(0),
                )
                .optional()?;

            let subscribed = match existing {
                Some(id) => {
                    tx.execute("DELETE FROM subscriptions WHERE id = ?1", [id])?;
                    false
                }
                None => {
                    tx.execute(
                        r#"
                        INSERT INTO subscriptions (id, subscriber, channel, created_at)
                        VALUES (?1, ?2, ?3, ?4)
                        "#,
                        params![new_id(), subscriber, channel, now_timestamp()],
                    )?;
                    true
                }
            };

            let subscribers_count = count(
                &tx,
                "SELECT COUNT(*) FROM subscriptions WHERE channel = ?1",
                [channel],
            )?;
            tx.commit()?;
            Ok(SubscriptionToggle {
                subscribed,
                subscribers_count,
            })
        })
    }

    pub fn channel_subscribers(
        &self,
        channel: &str,
        page: Pagination,
    ) -> Result<(Vec<SubscriberEntry>, i64)> {
        self.with_connection(|conn| {
            let total = count(
                conn,
                "SELECT COUNT(*) FROM subscriptions WHERE channel = ?1",
                [channel],
            )?;
            let mut stmt = conn.prepare(SUBSCRIBERS_SELECT)?;
            let subscribers = collect_rows(
                &mut stmt,
                params![channel, page.limit, page.offset()],
                row_to_subscriber,
            )?;
            Ok((subscribers, total))
        })
    }

    /// Channels `subscriber` follows, most recently subscribed first.
    pub fn subscribed_channels(
        &self,
        subscriber: &str,
        page: Pagination,
    ) -> Result<(Vec<SubscribedChannel>, i64)> {
        self.with_connection(|conn| {
            let total = count(
                conn,
                "SELECT COUNT(*) FROM subscriptions WHERE subscriber = ?1",
                [subscriber],
            )?;
            let mut stmt = conn.prepare(
                r#"
                SELECT s.id, s.subscriber, s.created_at,
                       u.id AS channel_id, u.username AS channel_username,
                       u.full_name AS channel_full_name, u.avatar AS channel_avatar
                FROM subscriptions s
                JOIN users u ON u.id = s.channel
                WHERE s.subscriber = ?1
                ORDER BY s.created_at DESC, s.rowid DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let channels = collect_rows(
                &mut stmt,
                params![subscriber, page.limit, page.offset()],
                |row| {
                    Ok(SubscribedChannel {
                        id: row.get("id")?,
                        subscriber: row.get("subscriber")?,
                        channel: owner_from(row, "channel")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )?;
            Ok((channels, total))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{temp_db, user};
    use crate::models::Pagination;

    #[test]
    fn toggle_flips_and_counts() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        let on = db.toggle_subscription(&bob.id, &alice.id).unwrap();
        assert!(on.subscribed);
        assert_eq!(on.subscribers_count, 1);
        let both = db.toggle_subscription(&carol.id, &alice.id).unwrap();
        assert_eq!(both.subscribers_count, 2);

        let off = db.toggle_subscription(&bob.id, &alice.id).unwrap();
        assert!(!off.subscribed);
        assert_eq!(off.subscribers_count, 1);
    }

    #[test]
    fn lists_both_directions() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        db.toggle_subscription(&bob.id, &alice.id).unwrap();
        db.toggle_subscription(&carol.id, &alice.id).unwrap();
        db.toggle_subscription(&bob.id, &carol.id).unwrap();

        let (subscribers, total) = db
            .channel_subscribers(&alice.id, Pagination::default())
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(subscribers[0].subscriber.username, "carol");
        assert_eq!(subscribers[1].subscriber.username, "bob");

        let (channels, total) = db
            .subscribed_channels(&bob.id, Pagination::new(Some(1), Some(1)))
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel.username, "carol");
    }
}
