//! Display helpers shared by client front ends.

use chrono::{DateTime, Utc};

use crate::models::{
    CommentRecord, CommentView, PlaylistRecord, PlaylistView, TweetRecord, TweetView,
    UserRecord, VideoRecord, VideoView,
};

const INTERVALS: [(&str, i64); 6] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
];

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub fn format_view_count(count: i64) -> String {
    let value = count as f64;
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}K", value / 1_000.0)
    } else if count < 1_000_000_000 {
        format!("{:.1}M", value / 1_000_000.0)
    } else {
        format!("{:.1}B", value / 1_000_000_000.0)
    }
}

/// "3 days ago" style age of an RFC 3339 timestamp relative to `now`.
/// Unparseable input is returned unchanged.
pub fn format_relative_time_at(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let elapsed = (now - then.with_timezone(&Utc)).num_seconds();
    for (label, seconds) in INTERVALS {
        let count = elapsed / seconds;
        if count > 0 {
            let plural = if count > 1 { "s" } else { "" };
            return format!("{count} {label}{plural} ago");
        }
    }
    "Just now".to_string()
}

pub fn format_relative_time(timestamp: &str) -> String {
    format_relative_time_at(timestamp, Utc::now())
}

/// Anything carrying an owner reference.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

macro_rules! owned_by_id {
    ($($ty:ty),*) => {
        $(impl Owned for $ty {
            fn owner_id(&self) -> &str {
                &self.owner
            }
        })*
    };
}

macro_rules! owned_by_summary {
    ($($ty:ty),*) => {
        $(impl Owned for $ty {
            fn owner_id(&self) -> &str {
                &self.owner.id
            }
        })*
    };
}

owned_by_id!(VideoRecord, CommentRecord, TweetRecord, PlaylistRecord);
owned_by_summary!(VideoView, CommentView, TweetView, PlaylistView);

pub fn is_owner(user: Option<&UserRecord>, content: &impl Owned) -> bool {
    user.is_some_and(|user| user.id == content.owner_id())
}
