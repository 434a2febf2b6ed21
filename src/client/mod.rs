//! Blocking client for the VideoTube REST API and the state layer built on it.
//!
//! [`ApiClient`] speaks the `{ statusCode, data, message, success }` envelope
//! and turns failed envelopes into [`ClientError::Api`] carrying the server's
//! message. It keeps the current token pair and, when a request is rejected
//! with 401, rotates the pair once through `/users/refresh-token` before
//! giving up.

pub mod format;
mod multipart;
pub mod session;
pub mod store;

use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use thiserror::Error;

pub use multipart::{FilePart, MultipartForm};
pub use session::Session;
pub use store::Store;

use crate::models::{
    ChannelProfile, ChannelStats, ChannelVideo, CommentRecord, CommentView, LikeToggle,
    LikedVideo, PageMeta, PaginatedDocs, PlaylistRecord, PlaylistView, SubscribedChannel,
    SubscriberEntry, SubscriptionToggle, TweetRecord, TweetView, UserRecord, VideoRecord,
    VideoView,
};
use crate::tokens::TokenPair;

const LOGIN_PATH: &str = "/users/login";
const REFRESH_PATH: &str = "/users/refresh-token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a failed envelope.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("not logged in")]
    SignedOut,
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("reading response failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: UserRecord,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoPage {
    pub videos: Vec<VideoView>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikedPage {
    pub likes: Vec<LikedVideo>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetPage {
    pub tweets: Vec<TweetView>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberPage {
    pub subscribers: Vec<SubscriberEntry>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPage {
    pub channels: Vec<SubscribedChannel>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelVideoPage {
    pub videos: Vec<ChannelVideo>,
    pub meta: PageMeta,
}

/// Filters for the public video feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

impl VideoListQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = page_pairs(self.page, self.limit);
        let text = [
            ("query", &self.query),
            ("sortBy", &self.sort_by),
            ("sortType", &self.sort_type),
            ("userId", &self.user_id),
        ];
        for (key, value) in text {
            if let Some(value) = value {
                pairs.push((key, value.clone()));
            }
        }
        pairs
    }
}

#[derive(Debug, Clone)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: FilePart,
    pub cover_image: Option<FilePart>,
}

#[derive(Debug, Clone)]
pub struct PublishForm {
    pub title: String,
    pub description: String,
    pub video_file: FilePart,
    pub thumbnail: FilePart,
}

/// Partial video edit; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct VideoEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<FilePart>,
}

enum Payload {
    Empty,
    Json(Value),
    Multipart { content_type: String, body: Vec<u8> },
}

impl From<MultipartForm> for Payload {
    fn from(form: MultipartForm) -> Self {
        let (content_type, body) = form.finish();
        Payload::Multipart { content_type, body }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    success: bool,
}

pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    tokens: Mutex<Option<TokenPair>>,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://127.0.0.1:8000/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            tokens: Mutex::new(None),
        }
    }

    pub fn with_tokens(self, tokens: Option<TokenPair>) -> Self {
        *self.tokens.lock() = tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens.lock().clone()
    }

    pub fn set_tokens(&self, tokens: Option<TokenPair>) {
        *self.tokens.lock() = tokens;
    }

    fn access_token(&self) -> Option<String> {
        self.tokens.lock().as_ref().map(|pair| pair.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.lock().as_ref().map(|pair| pair.refresh_token.clone())
    }

    pub fn register(&self, form: &RegisterForm) -> ClientResult<UserRecord> {
        let mut multipart = MultipartForm::new()
            .text("username", &form.username)
            .text("email", &form.email)
            .text("fullName", &form.full_name)
            .text("password", &form.password)
            .file("avatar", &form.avatar);
        if let Some(cover) = &form.cover_image {
            multipart = multipart.file("coverImage", cover);
        }
        self.send("POST", "/users/register", &[], multipart.into())
    }

    /// Logs in by email when `login` contains `@`, by username otherwise.
    pub fn login(&self, login: &str, password: &str) -> ClientResult<LoginData> {
        let body = if login.contains('@') {
            json!({ "email": login, "password": password })
        } else {
            json!({ "username": login, "password": password })
        };
        let data: LoginData = self.send("POST", LOGIN_PATH, &[], Payload::Json(body))?;
        self.set_tokens(Some(TokenPair {
            access_token: data.access_token.clone(),
            refresh_token: data.refresh_token.clone(),
        }));
        Ok(data)
    }

    /// Tokens are dropped locally even when the server call fails.
    pub fn logout(&self) -> ClientResult<()> {
        let result = self.send_unit("POST", "/users/logout", Payload::Empty);
        self.set_tokens(None);
        result
    }

    /// Rotates the token pair. A rejected refresh token signs the client out.
    pub fn refresh(&self) -> ClientResult<TokenPair> {
        let refresh_token = self.refresh_token().ok_or(ClientError::SignedOut)?;
        let body = json!({ "refreshToken": refresh_token });
        match self.attempt::<TokenPair>("POST", REFRESH_PATH, &[], &Payload::Json(body)) {
            Ok(pair) => {
                self.set_tokens(Some(pair.clone()));
                Ok(pair)
            }
            Err(err) => {
                if err.status() == Some(401) {
                    self.set_tokens(None);
                }
                Err(err)
            }
        }
    }

    pub fn current_user(&self) -> ClientResult<UserRecord> {
        self.get("/users/current-user", &[])
    }

    pub fn change_password(&self, old_password: &str, new_password: &str) -> ClientResult<()> {
        self.send_unit(
            "POST",
            "/users/change-password",
            Payload::Json(json!({ "oldPassword": old_password, "newPassword": new_password })),
        )
    }

    pub fn update_account(&self, full_name: &str, email: &str) -> ClientResult<UserRecord> {
        self.send(
            "PATCH",
            "/users/update-account",
            &[],
            Payload::Json(json!({ "fullName": full_name, "email": email })),
        )
    }

    pub fn update_avatar(&self, avatar: &FilePart) -> ClientResult<UserRecord> {
        let form = MultipartForm::new().file("avatar", avatar);
        self.send("PATCH", "/users/update-avatar", &[], form.into())
    }

    pub fn update_cover_image(&self, cover: &FilePart) -> ClientResult<UserRecord> {
        let form = MultipartForm::new().file("coverImage", cover);
        self.send("PATCH", "/users/cover-image", &[], form.into())
    }

    pub fn channel_profile(&self, username: &str) -> ClientResult<ChannelProfile> {
        self.get(&format!("/users/c/{username}"), &[])
    }

    pub fn watch_history(&self) -> ClientResult<Vec<VideoView>> {
        self.get("/users/history", &[])
    }

    pub fn videos(&self, query: &VideoListQuery) -> ClientResult<VideoPage> {
        self.get("/videos", &query.pairs())
    }

    pub fn video(&self, video_id: &str) -> ClientResult<VideoView> {
        self.get(&format!("/videos/{video_id}"), &[])
    }

    pub fn publish_video(&self, form: &PublishForm) -> ClientResult<VideoRecord> {
        let multipart = MultipartForm::new()
            .text("title", &form.title)
            .text("description", &form.description)
            .file("videoFile", &form.video_file)
            .file("thumbnail", &form.thumbnail);
        self.send("POST", "/videos", &[], multipart.into())
    }

    pub fn update_video(&self, video_id: &str, edit: &VideoEdit) -> ClientResult<VideoView> {
        let mut form = MultipartForm::new();
        if let Some(title) = &edit.title {
            form = form.text("title", title);
        }
        if let Some(description) = &edit.description {
            form = form.text("description", description);
        }
        if let Some(thumbnail) = &edit.thumbnail {
            form = form.file("thumbnail", thumbnail);
        }
        self.send("PATCH", &format!("/videos/{video_id}"), &[], form.into())
    }

    pub fn delete_video(&self, video_id: &str) -> ClientResult<()> {
        self.send_unit("DELETE", &format!("/videos/{video_id}"), Payload::Empty)
    }

    pub fn toggle_publish(&self, video_id: &str) -> ClientResult<VideoRecord> {
        self.send(
            "PATCH",
            &format!("/videos/toggle/publish/{video_id}"),
            &[],
            Payload::Empty,
        )
    }

    pub fn comments(
        &self,
        video_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<PaginatedDocs<CommentView>> {
        self.get(&format!("/comments/{video_id}"), &page_pairs(page, limit))
    }

    pub fn add_comment(&self, video_id: &str, content: &str) -> ClientResult<CommentRecord> {
        self.send(
            "POST",
            &format!("/comments/{video_id}"),
            &[],
            Payload::Json(json!({ "content": content })),
        )
    }

    pub fn update_comment(&self, comment_id: &str, content: &str) -> ClientResult<CommentRecord> {
        self.send(
            "PATCH",
            &format!("/comments/c/{comment_id}"),
            &[],
            Payload::Json(json!({ "content": content })),
        )
    }

    pub fn delete_comment(&self, comment_id: &str) -> ClientResult<()> {
        self.send_unit("DELETE", &format!("/comments/c/{comment_id}"), Payload::Empty)
    }

    pub fn toggle_video_like(&self, video_id: &str) -> ClientResult<LikeToggle> {
        self.send("POST", &format!("/likes/toggle/v/{video_id}"), &[], Payload::Empty)
    }

    pub fn toggle_comment_like(&self, comment_id: &str) -> ClientResult<LikeToggle> {
        self.send("POST", &format!("/likes/toggle/c/{comment_id}"), &[], Payload::Empty)
    }

    pub fn toggle_tweet_like(&self, tweet_id: &str) -> ClientResult<LikeToggle> {
        self.send("POST", &format!("/likes/toggle/t/{tweet_id}"), &[], Payload::Empty)
    }

    pub fn liked_videos(&self, page: Option<u32>, limit: Option<u32>) -> ClientResult<LikedPage> {
        self.get("/likes/videos", &page_pairs(page, limit))
    }

    pub fn create_tweet(&self, content: &str) -> ClientResult<TweetRecord> {
        self.send(
            "POST",
            "/tweets",
            &[],
            Payload::Json(json!({ "content": content })),
        )
    }

    pub fn user_tweets(
        &self,
        user_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<TweetPage> {
        self.get(&format!("/tweets/user/{user_id}"), &page_pairs(page, limit))
    }

    pub fn update_tweet(&self, tweet_id: &str, content: &str) -> ClientResult<TweetRecord> {
        self.send(
            "PATCH",
            &format!("/tweets/{tweet_id}"),
            &[],
            Payload::Json(json!({ "content": content })),
        )
    }

    pub fn delete_tweet(&self, tweet_id: &str) -> ClientResult<()> {
        self.send_unit("DELETE", &format!("/tweets/{tweet_id}"), Payload::Empty)
    }

    pub fn create_playlist(&self, name: &str, description: &str) -> ClientResult<PlaylistRecord> {
        self.send(
            "POST",
            "/playlist",
            &[],
            Payload::Json(json!({ "name": name, "description": description })),
        )
    }

    pub fn user_playlists(&self, user_id: &str) -> ClientResult<Vec<PlaylistView>> {
        self.get(&format!("/playlist/user/{user_id}"), &[])
    }

    pub fn playlist(&self, playlist_id: &str) -> ClientResult<PlaylistView> {
        self.get(&format!("/playlist/{playlist_id}"), &[])
    }

    pub fn update_playlist(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ClientResult<PlaylistRecord> {
        self.send(
            "PATCH",
            &format!("/playlist/{playlist_id}"),
            &[],
            Payload::Json(json!({ "name": name, "description": description })),
        )
    }

    pub fn delete_playlist(&self, playlist_id: &str) -> ClientResult<()> {
        self.send_unit("DELETE", &format!("/playlist/{playlist_id}"), Payload::Empty)
    }

    pub fn add_to_playlist(&self, video_id: &str, playlist_id: &str) -> ClientResult<PlaylistRecord> {
        self.send(
            "PATCH",
            &format!("/playlist/add/{video_id}/{playlist_id}"),
            &[],
            Payload::Empty,
        )
    }

    pub fn remove_from_playlist(
        &self,
        video_id: &str,
        playlist_id: &str,
    ) -> ClientResult<PlaylistRecord> {
        self.send(
            "PATCH",
            &format!("/playlist/remove/{video_id}/{playlist_id}"),
            &[],
            Payload::Empty,
        )
    }

    pub fn toggle_subscription(&self, channel_id: &str) -> ClientResult<SubscriptionToggle> {
        self.send(
            "POST",
            &format!("/subscriptions/c/{channel_id}"),
            &[],
            Payload::Empty,
        )
    }

    pub fn channel_subscribers(
        &self,
        channel_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<SubscriberPage> {
        self.get(
            &format!("/subscriptions/c/{channel_id}"),
            &page_pairs(page, limit),
        )
    }

    pub fn subscribed_channels(
        &self,
        subscriber_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<ChannelPage> {
        self.get(
            &format!("/subscriptions/u/{subscriber_id}"),
            &page_pairs(page, limit),
        )
    }

    pub fn channel_stats(&self) -> ClientResult<ChannelStats> {
        self.get("/dashboard/stats", &[])
    }

    pub fn channel_videos(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        sort_by: Option<&str>,
        sort_type: Option<&str>,
    ) -> ClientResult<ChannelVideoPage> {
        let mut pairs = page_pairs(page, limit);
        if let Some(sort_by) = sort_by {
            pairs.push(("sortBy", sort_by.to_string()));
        }
        if let Some(sort_type) = sort_type {
            pairs.push(("sortType", sort_type.to_string()));
        }
        self.get("/dashboard/videos", &pairs)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ClientResult<T> {
        self.send("GET", path, query, Payload::Empty)
    }

    fn send_unit(&self, method: &str, path: &str, payload: Payload) -> ClientResult<()> {
        self.send::<IgnoredAny>(method, path, &[], payload)
            .map(|_| ())
    }

    /// Sends once, and once more after a token rotation if the access
    /// token was rejected.
    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        payload: Payload,
    ) -> ClientResult<T> {
        let had_access_token = self.access_token().is_some();
        match self.attempt(method, path, query, &payload) {
            Err(ClientError::Api { status: 401, .. })
                if had_access_token && path != LOGIN_PATH && path != REFRESH_PATH =>
            {
                tracing::debug!(method, path, "access token rejected; refreshing");
                self.refresh()?;
                self.attempt(method, path, query, &payload)
            }
            result => result,
        }
    }

    fn attempt<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        payload: &Payload,
    ) -> ClientResult<T> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.agent.request(method, &url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        if let Some(token) = self.access_token() {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let outcome = match payload {
            Payload::Empty => request.call(),
            Payload::Json(body) => request.send_json(body),
            Payload::Multipart { content_type, body } => request
                .set("Content-Type", content_type)
                .send_bytes(body),
        };
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(ClientError::Transport(transport.to_string()));
            }
        };
        let status = response.status();
        let text = response.into_string()?;
        decode(status, &text)
    }
}

fn page_pairs(page: Option<u32>, limit: Option<u32>) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(page) = page {
        pairs.push(("page", page.to_string()));
    }
    if let Some(limit) = limit {
        pairs.push(("limit", limit.to_string()));
    }
    pairs
}

fn decode<T: DeserializeOwned>(status: u16, text: &str) -> ClientResult<T> {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(_) if status >= 400 => {
            let message = match text.trim() {
                "" => format!("request failed with status {status}"),
                body => body.to_string(),
            };
            return Err(ClientError::Api { status, message });
        }
        Err(err) => return Err(err.into()),
    };
    if status >= 400 || !envelope.success {
        return Err(ClientError::Api {
            status,
            message: envelope.message,
        });
    }
    Ok(serde_json::from_value(envelope.data)?)
}
