//! Records exchanged between the SQLite layer, the HTTP API and the client.
//!
//! Field names serialize in camelCase with `_id` identifiers because that is
//! the JSON shape API consumers already speak. Foreign keys are plain id
//! strings on the raw records; the `*View` types embed the referenced owner
//! summary the way list endpoints return them.

use serde::{Deserialize, Serialize};

/// Public profile of an account. Password hash and refresh token live in
/// [`UserCredentials`] and never reach a serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(default)]
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserRecord,
    pub password_hash: String,
    pub refresh_token: Option<String>,
}

/// Input for account creation; URLs point at already stored media.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub password_hash: String,
}

/// The projection of a user embedded into other records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

impl From<&UserRecord> for OwnerSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub video_file: String,
    pub thumbnail: String,
    pub duration: f64,
    pub owner: String,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    #[serde(rename = "_id")]
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: OwnerSummary,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preview_mode: Option<bool>,
}

/// Dashboard row: an owner's video with its engagement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub video_file: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: String,
    pub likes_count: i64,
    pub comments_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub video: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub video: String,
    pub owner: OwnerSummary,
    pub likes_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetView {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub owner: OwnerSummary,
    pub likes_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub videos: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Video summary embedded into playlists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub views: i64,
    pub owner: OwnerSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: OwnerSummary,
    pub videos: Vec<PlaylistVideo>,
    pub total_videos: usize,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub video: String,
    pub created_at: String,
    pub video_details: VideoView,
}

/// Which kind of record a like points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeTarget {
    Video(String),
    Comment(String),
    Tweet(String),
}

impl LikeTarget {
    pub fn column(&self) -> &'static str {
        match self {
            LikeTarget::Video(_) => "video",
            LikeTarget::Comment(_) => "comment",
            LikeTarget::Tweet(_) => "tweet",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LikeTarget::Video(id) | LikeTarget::Comment(id) | LikeTarget::Tweet(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionToggle {
    pub subscribed: bool,
    pub subscribers_count: i64,
}

/// A subscription seen from the channel: who subscribed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub subscriber: OwnerSummary,
    pub channel: String,
    pub created_at: String,
}

/// A subscription seen from the subscriber: which channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannel {
    #[serde(rename = "_id")]
    pub id: String,
    pub subscriber: String,
    pub channel: OwnerSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub avatar: String,
    pub cover_image: String,
    pub email: String,
    pub created_at: String,
    pub subscribers_count: i64,
    pub channels_subscribed_to_count: i64,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_videos: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_subscribers: i64,
    pub recent_subscribers: Vec<SubscriberEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

/// Page of documents in the `docs`/`totalDocs` layout used by comment lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedDocs<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub limit: u32,
    pub page: u32,
    pub total_pages: i64,
    pub paging_counter: i64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Ordering column accepted by video listings. Anything unknown falls back to
/// creation time so user input never reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSort {
    #[default]
    CreatedAt,
    Views,
    Duration,
    Title,
}

impl VideoSort {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("views") => VideoSort::Views,
            Some("duration") => VideoSort::Duration,
            Some("title") => VideoSort::Title,
            _ => VideoSort::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            VideoSort::CreatedAt => "v.created_at",
            VideoSort::Views => "v.views",
            VideoSort::Duration => "v.duration",
            VideoSort::Title => "v.title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta {
            total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages(total),
        }
    }

    pub fn docs<T>(&self, docs: Vec<T>, total: i64) -> PaginatedDocs<T> {
        let total_pages = self.total_pages(total);
        let has_prev_page = self.page > 1;
        let has_next_page = i64::from(self.page) < total_pages;
        PaginatedDocs {
            docs,
            total_docs: total,
            limit: self.limit,
            page: self.page,
            total_pages,
            paging_counter: self.offset() + 1,
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| self.page - 1),
            next_page: has_next_page.then(|| self.page + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_inputs() {
        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::new(None, None), Pagination::default());
    }

    #[test]
    fn pagination_meta_rounds_pages_up() {
        let p = Pagination::new(Some(2), Some(10));
        assert_eq!(p.offset(), 10);
        let meta = p.meta(21);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(p.meta(0).total_pages, 0);
    }

    #[test]
    fn paginated_docs_links_neighbours() {
        let docs = Pagination::new(Some(2), Some(5)).docs(vec![1, 2, 3, 4, 5], 12);
        assert_eq!(docs.paging_counter, 6);
        assert!(docs.has_prev_page);
        assert!(docs.has_next_page);
        assert_eq!(docs.prev_page, Some(1));
        assert_eq!(docs.next_page, Some(3));

        let last = Pagination::new(Some(3), Some(5)).docs(vec![11, 12], 12);
        assert!(!last.has_next_page);
        assert_eq!(last.next_page, None);
    }

    #[test]
    fn user_serializes_with_mongo_style_keys() {
        let user = UserRecord {
            id: "abc".into(),
            username: "bob".into(),
            email: "bob@example.com".into(),
            full_name: "Bob".into(),
            avatar: "/media/x.png".into(),
            cover_image: String::new(),
            created_at: "t".into(),
            updated_at: "t".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["_id"], "abc");
        assert_eq!(json["fullName"], "Bob");
        assert!(json.get("password").is_none());
    }

    #[test]
    fn sort_parsing_falls_back_to_created_at() {
        assert_eq!(VideoSort::parse(Some("views")), VideoSort::Views);
        assert_eq!(VideoSort::parse(Some("owner; DROP TABLE")), VideoSort::CreatedAt);
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }
}
