//! Client-side state, one slice per feature area.
//!
//! Every store operation follows the same bookkeeping: mark the slice
//! pending, perform the request, then either apply the result (fulfilled) or
//! record the error message (rejected). Readers take cloned snapshots so no
//! lock is held across a request.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{
    ApiClient, ClientResult, FilePart, PublishForm, RegisterForm, VideoEdit,
    VideoListQuery,
};
use crate::models::{
    ChannelProfile, ChannelStats, ChannelVideo, CommentRecord, CommentView, LikeToggle,
    LikedVideo, OwnerSummary, PageMeta, PlaylistView, SubscribedChannel, SubscriberEntry,
    SubscriptionToggle, TweetRecord, TweetView, UserRecord, VideoView,
};

/// Loading flag and last error carried by every slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatus {
    pub is_loading: bool,
    pub error: Option<String>,
}

impl RequestStatus {
    pub fn pending(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn fulfilled(&mut self) {
        self.is_loading = false;
    }

    pub fn rejected(&mut self, message: impl Into<String>) {
        self.is_loading = false;
        self.error = Some(message.into());
    }
}

pub trait Slice {
    fn status_mut(&mut self) -> &mut RequestStatus;
}

macro_rules! slice {
    ($($ty:ident),*) => {
        $(impl Slice for $ty {
            fn status_mut(&mut self) -> &mut RequestStatus {
                &mut self.status
            }
        })*
    };
}

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub status: RequestStatus,
    pub user: Option<UserRecord>,
    pub is_authenticated: bool,
    pub channel_profile: Option<ChannelProfile>,
    pub watch_history: Vec<VideoView>,
}

impl AuthState {
    fn sign_out(&mut self) {
        self.user = None;
        self.is_authenticated = false;
        self.channel_profile = None;
        self.watch_history.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoState {
    pub status: RequestStatus,
    pub videos: Vec<VideoView>,
    pub meta: Option<PageMeta>,
    pub current: Option<VideoView>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentState {
    pub status: RequestStatus,
    pub comments: Vec<CommentView>,
    pub total_comments: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LikeState {
    pub status: RequestStatus,
    pub video_likes: HashMap<String, LikeToggle>,
    pub comment_likes: HashMap<String, LikeToggle>,
    pub tweet_likes: HashMap<String, LikeToggle>,
    pub liked_videos: Vec<LikedVideo>,
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistState {
    pub status: RequestStatus,
    pub user_playlists: Vec<PlaylistView>,
    pub current: Option<PlaylistView>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionState {
    pub status: RequestStatus,
    pub subscription_status: HashMap<String, SubscriptionToggle>,
    pub subscribed_channels: Vec<SubscribedChannel>,
    pub total_subscribed_channels: i64,
    pub channel_subscribers: Vec<SubscriberEntry>,
    pub total_subscribers: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TweetState {
    pub status: RequestStatus,
    pub user_id: Option<String>,
    pub tweets: Vec<TweetView>,
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub status: RequestStatus,
    pub stats: Option<ChannelStats>,
    pub videos: Vec<ChannelVideo>,
    pub meta: Option<PageMeta>,
}

slice!(
    AuthState,
    VideoState,
    CommentState,
    LikeState,
    PlaylistState,
    SubscriptionState,
    TweetState,
    DashboardState
);

pub struct Store {
    client: ApiClient,
    auth: RwLock<AuthState>,
    video: RwLock<VideoState>,
    comment: RwLock<CommentState>,
    like: RwLock<LikeState>,
    playlist: RwLock<PlaylistState>,
    subscription: RwLock<SubscriptionState>,
    tweet: RwLock<TweetState>,
    dashboard: RwLock<DashboardState>,
}

impl Store {
    pub fn new(client: ApiClient) -> Self {
        let signed_in = client.tokens().is_some();
        Self {
            client,
            auth: RwLock::new(AuthState {
                is_authenticated: signed_in,
                ..AuthState::default()
            }),
            video: RwLock::default(),
            comment: RwLock::default(),
            like: RwLock::default(),
            playlist: RwLock::default(),
            subscription: RwLock::default(),
            tweet: RwLock::default(),
            dashboard: RwLock::default(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> AuthState {
        self.auth.read().clone()
    }

    pub fn video(&self) -> VideoState {
        self.video.read().clone()
    }

    pub fn comment(&self) -> CommentState {
        self.comment.read().clone()
    }

    pub fn like(&self) -> LikeState {
        self.like.read().clone()
    }

    pub fn playlist(&self) -> PlaylistState {
        self.playlist.read().clone()
    }

    pub fn subscription(&self) -> SubscriptionState {
        self.subscription.read().clone()
    }

    pub fn tweet(&self) -> TweetState {
        self.tweet.read().clone()
    }

    pub fn dashboard(&self) -> DashboardState {
        self.dashboard.read().clone()
    }

    /// pending → request → fulfilled (with `apply`) or rejected.
    fn dispatch<S, T, R>(
        &self,
        slice: &RwLock<S>,
        request: impl FnOnce(&ApiClient) -> ClientResult<T>,
        apply: impl FnOnce(&mut S, T) -> R,
    ) -> ClientResult<R>
    where
        S: Slice,
    {
        slice.write().status_mut().pending();
        match request(&self.client) {
            Ok(value) => {
                let mut state = slice.write();
                state.status_mut().fulfilled();
                Ok(apply(&mut *state, value))
            }
            Err(err) => {
                slice.write().status_mut().rejected(err.to_string());
                Err(err)
            }
        }
    }

    fn current_owner(&self) -> Option<OwnerSummary> {
        self.auth.read().user.as_ref().map(OwnerSummary::from)
    }

    pub fn register(&self, form: &RegisterForm) -> ClientResult<()> {
        self.dispatch(&self.auth, |client| client.register(form), |_, _| {})
    }

    pub fn login(&self, login: &str, password: &str) -> ClientResult<()> {
        let result = self.dispatch(
            &self.auth,
            |client| client.login(login, password),
            |state, data| {
                state.user = Some(data.user);
                state.is_authenticated = true;
            },
        );
        if result.is_err() {
            self.auth.write().is_authenticated = false;
        }
        result
    }

    /// Local state is cleared whether or not the server acknowledged.
    pub fn logout(&self) -> ClientResult<()> {
        let result = self.dispatch(&self.auth, |client| client.logout(), |_, _| {});
        self.auth.write().sign_out();
        result
    }

    pub fn refresh(&self) -> ClientResult<()> {
        let result = self.dispatch(
            &self.auth,
            |client| client.refresh(),
            |state, _| state.is_authenticated = true,
        );
        if result.is_err() {
            self.auth.write().sign_out();
        }
        result
    }

    pub fn load_current_user(&self) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.current_user(),
            |state, user| {
                state.user = Some(user);
                state.is_authenticated = true;
            },
        )
    }

    pub fn change_password(&self, old_password: &str, new_password: &str) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.change_password(old_password, new_password),
            |_, _| {},
        )
    }

    pub fn update_account(&self, full_name: &str, email: &str) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.update_account(full_name, email),
            |state, user| state.user = Some(user),
        )
    }

    pub fn update_avatar(&self, avatar: &FilePart) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.update_avatar(avatar),
            |state, user| state.user = Some(user),
        )
    }

    pub fn update_cover_image(&self, cover: &FilePart) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.update_cover_image(cover),
            |state, user| state.user = Some(user),
        )
    }

    pub fn load_channel_profile(&self, username: &str) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.channel_profile(username),
            |state, profile| state.channel_profile = Some(profile),
        )
    }

    pub fn load_watch_history(&self) -> ClientResult<()> {
        self.dispatch(
            &self.auth,
            |client| client.watch_history(),
            |state, history| state.watch_history = history,
        )
    }

    pub fn load_videos(&self, query: &VideoListQuery) -> ClientResult<()> {
        self.dispatch(
            &self.video,
            |client| client.videos(query),
            |state, page| {
                state.videos = page.videos;
                state.meta = Some(page.meta);
            },
        )
    }

    pub fn load_video(&self, video_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.video,
            |client| client.video(video_id),
            |state, video| state.current = Some(video),
        )
    }

    /// Publishes and returns the new video id; the feed is not reloaded.
    pub fn publish_video(&self, form: &PublishForm) -> ClientResult<String> {
        self.dispatch(
            &self.video,
            |client| client.publish_video(form),
            |_, video| video.id,
        )
    }

    pub fn update_video(&self, video_id: &str, edit: &VideoEdit) -> ClientResult<()> {
        self.dispatch(
            &self.video,
            |client| client.update_video(video_id, edit),
            |state, video| {
                if let Some(existing) = state.videos.iter_mut().find(|v| v.id == video.id) {
                    *existing = video.clone();
                }
                if state.current.as_ref().is_some_and(|v| v.id == video.id) {
                    state.current = Some(video);
                }
            },
        )
    }

    pub fn delete_video(&self, video_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.video,
            |client| client.delete_video(video_id),
            |state, ()| {
                state.videos.retain(|video| video.id != video_id);
                if state.current.as_ref().is_some_and(|v| v.id == video_id) {
                    state.current = None;
                }
            },
        )?;
        let mut dashboard = self.dashboard.write();
        dashboard.videos.retain(|video| video.id != video_id);
        Ok(())
    }

    pub fn toggle_publish(&self, video_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.video,
            |client| client.toggle_publish(video_id),
            |state, record| {
                if let Some(current) = state.current.as_mut().filter(|v| v.id == record.id) {
                    current.is_published = record.is_published;
                }
                if !record.is_published {
                    state.videos.retain(|video| video.id != record.id);
                }
            },
        )
    }

    pub fn load_comments(
        &self,
        video_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.comment,
            |client| client.comments(video_id, page, limit),
            |state, docs| {
                state.comments = docs.docs;
                state.total_comments = docs.total_docs;
                state.total_pages = docs.total_pages;
                state.current_page = docs.page;
                state.has_next_page = docs.has_next_page;
                state.has_prev_page = docs.has_prev_page;
            },
        )
    }

    pub fn add_comment(&self, video_id: &str, content: &str) -> ClientResult<()> {
        let owner = self.current_owner();
        self.dispatch(
            &self.comment,
            |client| client.add_comment(video_id, content),
            |state, record| {
                if let Some(owner) = owner {
                    state.comments.insert(0, comment_view(record, owner));
                    state.total_comments += 1;
                }
            },
        )
    }

    pub fn update_comment(&self, comment_id: &str, content: &str) -> ClientResult<()> {
        self.dispatch(
            &self.comment,
            |client| client.update_comment(comment_id, content),
            |state, record| {
                if let Some(existing) = state.comments.iter_mut().find(|c| c.id == record.id) {
                    existing.content = record.content;
                    existing.updated_at = record.updated_at;
                }
            },
        )
    }

    pub fn delete_comment(&self, comment_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.comment,
            |client| client.delete_comment(comment_id),
            |state, ()| {
                let before = state.comments.len();
                state.comments.retain(|comment| comment.id != comment_id);
                if state.comments.len() < before {
                    state.total_comments = (state.total_comments - 1).max(0);
                }
            },
        )
    }

    pub fn toggle_video_like(&self, video_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.like,
            |client| client.toggle_video_like(video_id),
            |state, toggle| {
                if !toggle.liked {
                    state.liked_videos.retain(|like| like.video != video_id);
                }
                state.video_likes.insert(video_id.to_string(), toggle);
            },
        )
    }

    pub fn toggle_comment_like(&self, comment_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.like,
            |client| client.toggle_comment_like(comment_id),
            |state, toggle| {
                state.comment_likes.insert(comment_id.to_string(), toggle);
            },
        )?;
        if let Some(toggle) = self.like.read().comment_likes.get(comment_id).copied() {
            let mut comments = self.comment.write();
            if let Some(comment) = comments.comments.iter_mut().find(|c| c.id == comment_id) {
                comment.likes_count = toggle.likes_count;
            }
        }
        Ok(())
    }

    pub fn toggle_tweet_like(&self, tweet_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.like,
            |client| client.toggle_tweet_like(tweet_id),
            |state, toggle| {
                state.tweet_likes.insert(tweet_id.to_string(), toggle);
            },
        )?;
        if let Some(toggle) = self.like.read().tweet_likes.get(tweet_id).copied() {
            let mut tweets = self.tweet.write();
            if let Some(tweet) = tweets.tweets.iter_mut().find(|t| t.id == tweet_id) {
                tweet.likes_count = toggle.likes_count;
            }
        }
        Ok(())
    }

    pub fn load_liked_videos(&self, page: Option<u32>, limit: Option<u32>) -> ClientResult<()> {
        self.dispatch(
            &self.like,
            |client| client.liked_videos(page, limit),
            |state, page| {
                state.liked_videos = page.likes;
                state.meta = Some(page.meta);
            },
        )
    }

    pub fn create_playlist(&self, name: &str, description: &str) -> ClientResult<()> {
        let owner = self.current_owner();
        self.dispatch(
            &self.playlist,
            |client| client.create_playlist(name, description),
            |state, record| {
                if let Some(owner) = owner {
                    state.user_playlists.insert(
                        0,
                        PlaylistView {
                            id: record.id,
                            name: record.name,
                            description: record.description,
                            owner,
                            videos: Vec::new(),
                            total_videos: 0,
                            created_at: record.created_at,
                            updated_at: record.updated_at,
                        },
                    );
                }
            },
        )
    }

    pub fn load_user_playlists(&self, user_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| client.user_playlists(user_id),
            |state, playlists| state.user_playlists = playlists,
        )
    }

    pub fn load_playlist(&self, playlist_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| client.playlist(playlist_id),
            |state, playlist| state.current = Some(playlist),
        )
    }

    pub fn update_playlist(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| client.update_playlist(playlist_id, name, description),
            |state, record| {
                let matching = state
                    .user_playlists
                    .iter_mut()
                    .chain(state.current.as_mut())
                    .filter(|playlist| playlist.id == record.id);
                for playlist in matching {
                    playlist.name = record.name.clone();
                    playlist.description = record.description.clone();
                    playlist.updated_at = record.updated_at.clone();
                }
            },
        )
    }

    pub fn delete_playlist(&self, playlist_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| client.delete_playlist(playlist_id),
            |state, ()| {
                state.user_playlists.retain(|playlist| playlist.id != playlist_id);
                if state.current.as_ref().is_some_and(|p| p.id == playlist_id) {
                    state.current = None;
                }
            },
        )
    }

    /// Membership changes reload the playlist so embedded videos stay whole.
    pub fn add_to_playlist(&self, video_id: &str, playlist_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| {
                client.add_to_playlist(video_id, playlist_id)?;
                client.playlist(playlist_id)
            },
            apply_playlist,
        )
    }

    pub fn remove_from_playlist(&self, video_id: &str, playlist_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.playlist,
            |client| {
                client.remove_from_playlist(video_id, playlist_id)?;
                client.playlist(playlist_id)
            },
            apply_playlist,
        )
    }

    pub fn toggle_subscription(&self, channel_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.subscription,
            |client| client.toggle_subscription(channel_id),
            |state, toggle| {
                if !toggle.subscribed {
                    let before = state.subscribed_channels.len();
                    state
                        .subscribed_channels
                        .retain(|entry| entry.channel.id != channel_id);
                    if state.subscribed_channels.len() < before {
                        state.total_subscribed_channels =
                            (state.total_subscribed_channels - 1).max(0);
                    }
                }
                state
                    .subscription_status
                    .insert(channel_id.to_string(), toggle);
            },
        )?;
        let toggle = self.subscription.read().subscription_status.get(channel_id).copied();
        if let Some(toggle) = toggle {
            let mut auth = self.auth.write();
            if let Some(profile) = auth.channel_profile.as_mut().filter(|p| p.id == channel_id) {
                profile.is_subscribed = toggle.subscribed;
                profile.subscribers_count = toggle.subscribers_count;
            }
        }
        Ok(())
    }

    pub fn load_subscribers(
        &self,
        channel_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.subscription,
            |client| client.channel_subscribers(channel_id, page, limit),
            |state, page| {
                state.channel_subscribers = page.subscribers;
                state.total_subscribers = page.meta.total;
            },
        )
    }

    pub fn load_subscribed_channels(
        &self,
        subscriber_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.subscription,
            |client| client.subscribed_channels(subscriber_id, page, limit),
            |state, page| {
                state.subscribed_channels = page.channels;
                state.total_subscribed_channels = page.meta.total;
            },
        )
    }

    pub fn create_tweet(&self, content: &str) -> ClientResult<()> {
        let owner = self.current_owner();
        self.dispatch(
            &self.tweet,
            |client| client.create_tweet(content),
            |state, record| {
                let Some(owner) = owner else { return };
                if state.user_id.as_deref() == Some(owner.id.as_str()) {
                    state.tweets.insert(0, tweet_view(record, owner));
                }
            },
        )
    }

    pub fn load_user_tweets(
        &self,
        user_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.tweet,
            |client| client.user_tweets(user_id, page, limit),
            |state, page| {
                state.user_id = Some(user_id.to_string());
                state.tweets = page.tweets;
                state.meta = Some(page.meta);
            },
        )
    }

    pub fn update_tweet(&self, tweet_id: &str, content: &str) -> ClientResult<()> {
        self.dispatch(
            &self.tweet,
            |client| client.update_tweet(tweet_id, content),
            |state, record| {
                if let Some(existing) = state.tweets.iter_mut().find(|t| t.id == record.id) {
                    existing.content = record.content;
                    existing.updated_at = record.updated_at;
                }
            },
        )
    }

    pub fn delete_tweet(&self, tweet_id: &str) -> ClientResult<()> {
        self.dispatch(
            &self.tweet,
            |client| client.delete_tweet(tweet_id),
            |state, ()| state.tweets.retain(|tweet| tweet.id != tweet_id),
        )
    }

    pub fn load_stats(&self) -> ClientResult<()> {
        self.dispatch(
            &self.dashboard,
            |client| client.channel_stats(),
            |state, stats| state.stats = Some(stats),
        )
    }

    pub fn load_channel_videos(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        sort_by: Option<&str>,
        sort_type: Option<&str>,
    ) -> ClientResult<()> {
        self.dispatch(
            &self.dashboard,
            |client| client.channel_videos(page, limit, sort_by, sort_type),
            |state, page| {
                state.videos = page.videos;
                state.meta = Some(page.meta);
            },
        )
    }
}

fn apply_playlist(state: &mut PlaylistState, playlist: PlaylistView) {
    if let Some(existing) = state
        .user_playlists
        .iter_mut()
        .find(|existing| existing.id == playlist.id)
    {
        *existing = playlist.clone();
    }
    state.current = Some(playlist);
}

fn comment_view(record: CommentRecord, owner: OwnerSummary) -> CommentView {
    CommentView {
        id: record.id,
        content: record.content,
        video: record.video,
        owner,
        likes_count: 0,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn tweet_view(record: TweetRecord, owner: OwnerSummary) -> TweetView {
    TweetView {
        id: record.id,
        content: record.content,
        owner,
        likes_count: 0,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}
