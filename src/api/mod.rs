//! REST API served under `/api/v1`.
//!
//! Handlers stay thin: they validate input, then move the database work onto
//! a blocking thread through [`AppState::run`]. Every response, success or
//! failure, uses the `{ statusCode, data, message, success }` envelope.

pub mod auth;
mod comments;
mod dashboard;
pub mod error;
mod extract;
mod health;
mod likes;
mod media;
mod playlists;
pub mod response;
mod subscriptions;
mod tweets;
mod users;
mod videos;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::media::MediaStorage;
use crate::models::{Pagination, VideoRecord};
use crate::store::{Database, is_valid_id};
use crate::tokens::TokenService;
use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    pub media: Arc<dyn MediaStorage>,
    pub cookie_secure: bool,
}

impl AppState {
    /// Runs blocking work (SQLite, file writes) on the blocking pool.
    pub async fn run<F, T>(&self, work: F) -> ApiResult<T>
    where
        F: FnOnce(Database) -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(db)).await?
    }
}

/// Transport settings that shape the router but not the handlers.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl From<&ServerConfig> for HttpSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            cors_origin: config.cors_origin.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn router(state: AppState, settings: &HttpSettings) -> Result<Router> {
    let users = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout))
        .route("/refresh-token", post(users::refresh_token))
        .route("/change-password", post(users::change_password))
        .route("/current-user", get(users::current_user))
        .route("/update-account", patch(users::update_account))
        .route("/update-avatar", patch(users::update_avatar))
        .route("/cover-image", patch(users::update_cover_image))
        .route("/c/{username}", get(users::channel_profile))
        .route("/history", get(users::watch_history));

    let videos = Router::new()
        .route("/", get(videos::list).post(videos::publish))
        .route(
            "/{video_id}",
            get(videos::get_one).patch(videos::update).delete(videos::delete),
        )
        .route("/toggle/publish/{video_id}", patch(videos::toggle_publish));

    let comments = Router::new()
        .route("/{video_id}", get(comments::list).post(comments::add))
        .route(
            "/c/{comment_id}",
            patch(comments::update).delete(comments::delete),
        );

    let likes = Router::new()
        .route("/toggle/v/{video_id}", post(likes::toggle_video))
        .route("/toggle/c/{comment_id}", post(likes::toggle_comment))
        .route("/toggle/t/{tweet_id}", post(likes::toggle_tweet))
        .route("/videos", get(likes::liked_videos));

    let tweets = Router::new()
        .route("/", post(tweets::create))
        .route("/user/{user_id}", get(tweets::list_for_user))
        .route("/{tweet_id}", patch(tweets::update).delete(tweets::delete));

    let playlists = Router::new()
        .route("/", post(playlists::create))
        .route("/user/{user_id}", get(playlists::list_for_user))
        .route(
            "/{playlist_id}",
            get(playlists::get_one)
                .patch(playlists::update)
                .delete(playlists::delete),
        )
        .route("/add/{video_id}/{playlist_id}", patch(playlists::add_video))
        .route(
            "/remove/{video_id}/{playlist_id}",
            patch(playlists::remove_video),
        );

    let subscriptions = Router::new()
        .route(
            "/c/{channel_id}",
            post(subscriptions::toggle).get(subscriptions::subscribers),
        )
        .route("/u/{subscriber_id}", get(subscriptions::channels));

    let dashboard = Router::new()
        .route("/stats", get(dashboard::stats))
        .route("/videos", get(dashboard::videos));

    let api = Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .nest("/users", users)
        .nest("/videos", videos)
        .nest("/comments", comments)
        .nest("/likes", likes)
        .nest("/tweets", tweets)
        .nest("/playlist", playlists)
        .nest("/subscriptions", subscriptions)
        .nest("/dashboard", dashboard);

    Ok(Router::new()
        .nest("/api/v1", api)
        .route("/media/{file}", get(media::serve))
        .fallback(|| async { ApiError::not_found("Route not found") })
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors_layer(&settings.cors_origin)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// `*` allows any origin without credentials; a comma separated list of
/// origins allows cookies from exactly those origins.
fn cors_layer(origin: &str) -> Result<CorsLayer> {
    if origin.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = origin
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            HeaderValue::from_str(value).with_context(|| format!("invalid CORS origin {value:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// `?page=&limit=` shared by every paginated listing.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

pub(crate) fn ensure_id(value: &str, label: &str) -> ApiResult<()> {
    if is_valid_id(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid {label} id")))
    }
}

/// Loads a video the caller may interact with. Unpublished videos are 404
/// for everyone but their owner.
pub(crate) fn visible_video(
    db: &Database,
    video_id: &str,
    viewer: Option<&str>,
) -> ApiResult<VideoRecord> {
    db.find_video(video_id)?
        .filter(|video| video.is_published || viewer == Some(video.owner.as_str()))
        .ok_or_else(|| ApiError::not_found("Video not found"))
}

pub(crate) fn ensure_owner(owner: &str, user_id: &str, message: &str) -> ApiResult<()> {
    if owner == user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden(message))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::TokenSettings;
    use crate::media::LocalMediaStorage;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
        _dir: TempDir,
    }

    pub struct Reply {
        pub status: StatusCode,
        pub headers: axum::http::HeaderMap,
        pub body: Value,
    }

    pub fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("api.db")).unwrap();
        let media = LocalMediaStorage::new(dir.path().join("media"), "/media").unwrap();
        let tokens = TokenService::new(&TokenSettings {
            access_secret: "access-secret".into(),
            access_ttl: Duration::from_secs(600),
            refresh_secret: "refresh-secret".into(),
            refresh_ttl: Duration::from_secs(6000),
        });
        let state = AppState {
            db,
            tokens: Arc::new(tokens),
            media: Arc::new(media),
            cookie_secure: false,
        };
        let settings = HttpSettings {
            cors_origin: "*".into(),
            max_upload_bytes: 1024 * 1024,
        };
        TestApp {
            router: router(state.clone(), &settings).unwrap(),
            state,
            _dir: dir,
        }
    }

    impl TestApp {
        /// Registers a user straight through the store and returns it with
        /// a fresh access token.
        pub fn user(&self, name: &str) -> (crate::models::UserRecord, String) {
            let user = self
                .state
                .db
                .insert_user(crate::models::NewUser {
                    username: name.into(),
                    email: format!("{name}@example.com"),
                    full_name: format!("{name} tester"),
                    avatar: "/media/a.png".into(),
                    cover_image: String::new(),
                    password_hash: crate::security::hash_password("secret-pass").unwrap(),
                })
                .unwrap();
            let token = self.state.tokens.issue_access(&user).unwrap();
            (user, token)
        }

        pub async fn send(&self, request: Request<Body>) -> Reply {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), 4 * 1024 * 1024).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            Reply {
                status,
                headers,
                body,
            }
        }

        pub async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Reply {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(request).await
        }
    }

    /// Builds a multipart body from text fields and `(field, file name,
    /// content type, bytes)` files.
    pub fn multipart(
        text: &[(&str, &str)],
        files: &[(&str, &str, &str, &[u8])],
    ) -> (String, Vec<u8>) {
        let boundary = "videotube-test-boundary";
        let mut body = Vec::new();
        for (name, value) in text {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, content_type, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }
}
