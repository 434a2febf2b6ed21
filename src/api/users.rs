use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::auth::{
    ACCESS_COOKIE, CurrentUser, MaybeUser, REFRESH_COOKIE, clear_cookie, cookie, token_cookie,
};
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, UploadForm, required};
use super::response::{ApiResponse, Empty};
use crate::media::MediaKind;
use crate::models::{ChannelProfile, NewUser, UserRecord, VideoView};
use crate::security::{hash_password, verify_password};
use crate::tokens::TokenPair;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    user: UserRecord,
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    old_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountBody {
    full_name: Option<String>,
    email: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<UserRecord>> {
    let full_name = required(form.text("fullName"), "Full name")?;
    let email = required(form.text("email"), "Email")?.to_lowercase();
    let username = required(form.text("username"), "Username")?.to_lowercase();
    if !is_valid_username(&username) {
        return Err(ApiError::bad_request(
            "Username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    let password = required(form.text("password"), "Password")?;
    let avatar = form.take_file("avatar");
    let cover_image = form.take_file("coverImage");

    let media = state.media.clone();
    let user = state
        .run(move |db| {
            if db.user_exists(&username, &email)? {
                return Err(ApiError::conflict(
                    "User with email or username already exists",
                ));
            }
            let avatar = avatar.ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;
            let avatar = media.store(MediaKind::Image, &avatar)?;
            let cover_image = match cover_image {
                Some(upload) => media.store(MediaKind::Image, &upload)?.url,
                None => String::new(),
            };

            let password_hash = hash_password(&password)?;
            db.insert_user(NewUser {
                username,
                email,
                full_name,
                avatar: avatar.url,
                cover_image,
                password_hash,
            })
            .map_err(|err| {
                ApiError::conflict_or_internal(err, "User with email or username already exists")
            })
        })
        .await?;

    tracing::info!(user = %user.id, username = %user.username, "registered user");
    Ok(ApiResponse::created(user, "User registered successfully"))
}

/// Lowercase ASCII letters, digits and `_` `.` `-` only.
fn is_valid_username(username: &str) -> bool {
    username
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'.' | b'-'))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginBody>,
) -> ApiResult<Response> {
    let username = normalized(body.username).map(|value| value.to_lowercase());
    let email = normalized(body.email).map(|value| value.to_lowercase());
    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request("Username or email is required"));
    }
    let password = required(body.password.as_deref(), "Password")?;

    let tokens = state.tokens.clone();
    let (user, pair) = state
        .run(move |db| {
            let credentials = db
                .find_credentials_by_login(username.as_deref(), email.as_deref())?
                .ok_or_else(|| ApiError::not_found("User does not exist"))?;
            if !verify_password(&password, &credentials.password_hash) {
                return Err(ApiError::unauthorized("Invalid user credentials"));
            }
            let pair = tokens
                .issue_pair(&credentials.user)
                .map_err(anyhow::Error::new)?;
            db.set_refresh_token(&credentials.user.id, Some(&pair.refresh_token))?;
            Ok((credentials.user, pair))
        })
        .await?;

    tracing::info!(user = %user.id, "user logged in");
    let cookies = session_cookies(&state, &pair)?;
    let data = LoginData {
        user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };
    Ok(with_cookies(
        ApiResponse::ok(data, "User logged in successfully").into_response(),
        cookies,
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Response> {
    let user_id = user.id.clone();
    state
        .run(move |db| Ok(db.set_refresh_token(&user_id, None)?))
        .await?;

    let cookies = vec![
        clear_cookie(ACCESS_COOKIE, state.cookie_secure)?,
        clear_cookie(REFRESH_COOKIE, state.cookie_secure)?,
    ];
    Ok(with_cookies(
        ApiResponse::ok(Empty::default(), "User logged out").into_response(),
        cookies,
    ))
}

/// Rotates the token pair. The stored refresh token is replaced, so the
/// presented one can never be used twice.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshBody>(&body)
            .unwrap_or_default()
            .refresh_token
    };
    let incoming = cookie(&headers, REFRESH_COOKIE)
        .or(normalized(from_body))
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state.tokens.verify_refresh(&incoming).map_err(|err| {
        tracing::debug!(error = %err, "rejected refresh token");
        ApiError::unauthorized("Invalid refresh token")
    })?;

    let tokens = state.tokens.clone();
    let pair = state
        .run(move |db| {
            let credentials = db
                .find_credentials(&claims.id)?
                .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;
            if credentials.refresh_token.as_deref() != Some(incoming.as_str()) {
                return Err(ApiError::unauthorized("Refresh token is expired or used"));
            }
            let pair = tokens
                .issue_pair(&credentials.user)
                .map_err(anyhow::Error::new)?;
            db.set_refresh_token(&credentials.user.id, Some(&pair.refresh_token))?;
            Ok(pair)
        })
        .await?;

    let cookies = session_cookies(&state, &pair)?;
    Ok(with_cookies(
        ApiResponse::ok(pair, "Access token refreshed").into_response(),
        cookies,
    ))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<ChangePasswordBody>,
) -> ApiResult<ApiResponse<Empty>> {
    let old_password = required(body.old_password.as_deref(), "Old password")?;
    let new_password = required(body.new_password.as_deref(), "New password")?;

    state
        .run(move |db| {
            let credentials = db
                .find_credentials(&user.id)?
                .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;
            if !verify_password(&old_password, &credentials.password_hash) {
                return Err(ApiError::unauthorized("Invalid old password"));
            }
            db.set_password_hash(&user.id, &hash_password(&new_password)?)?;
            Ok(())
        })
        .await?;

    Ok(ApiResponse::ok(Empty::default(), "Password changed successfully"))
}

pub async fn current_user(CurrentUser(user): CurrentUser) -> ApiResponse<UserRecord> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<UpdateAccountBody>,
) -> ApiResult<ApiResponse<UserRecord>> {
    let (Some(full_name), Some(email)) = (normalized(body.full_name), normalized(body.email))
    else {
        return Err(ApiError::bad_request("Full name and email are required"));
    };
    let email = email.to_lowercase();

    let updated = state
        .run(move |db| {
            if db.email_taken_by_other(&email, &user.id)? {
                return Err(ApiError::conflict("Email is already in use"));
            }
            db.update_account(&user.id, &full_name, &email)
                .map_err(|err| ApiError::conflict_or_internal(err, "Email is already in use"))?
                .ok_or_else(|| ApiError::not_found("User does not exist"))
        })
        .await?;

    Ok(ApiResponse::ok(updated, "Account details updated successfully"))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<UserRecord>> {
    let upload = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::bad_request("Avatar file is missing"))?;
    let media = state.media.clone();
    let updated = state
        .run(move |db| {
            let stored = media.store(MediaKind::Image, &upload)?;
            db.update_avatar(&user.id, &stored.url)?
                .ok_or_else(|| ApiError::not_found("User does not exist"))
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Avatar image updated successfully"))
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<UserRecord>> {
    let upload = form
        .take_file("coverImage")
        .ok_or_else(|| ApiError::bad_request("Cover image file is missing"))?;
    let media = state.media.clone();
    let updated = state
        .run(move |db| {
            let stored = media.store(MediaKind::Image, &upload)?;
            db.update_cover_image(&user.id, &stored.url)?
                .ok_or_else(|| ApiError::not_found("User does not exist"))
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Cover image updated successfully"))
}

pub async fn channel_profile(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let username = normalized(Some(username))
        .ok_or_else(|| ApiError::bad_request("Username is missing"))?
        .to_lowercase();
    let profile = state
        .run(move |db| {
            db.channel_profile(&username, viewer.as_ref().map(|user| user.id.as_str()))?
                .ok_or_else(|| ApiError::not_found("Channel does not exist"))
        })
        .await?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<VideoView>>> {
    let history = state.run(move |db| Ok(db.watch_history(&user.id)?)).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn session_cookies(state: &AppState, pair: &TokenPair) -> ApiResult<Vec<HeaderValue>> {
    Ok(vec![
        token_cookie(
            ACCESS_COOKIE,
            &pair.access_token,
            state.tokens.access_ttl().as_secs(),
            state.cookie_secure,
        )?,
        token_cookie(
            REFRESH_COOKIE,
            &pair.refresh_token,
            state.tokens.refresh_ttl().as_secs(),
            state.cookie_secure,
        )?,
    ])
}

fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    for value in cookies {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, multipart};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::json;

    #[tokio::test]
    async fn register_then_login_sets_cookies() {
        let app = app();
        let (content_type, body) = multipart(
            &[
                ("fullName", "Alice Liddell"),
                ("email", "Alice@Example.com"),
                ("username", "Alice"),
                ("password", "wonderland"),
            ],
            &[("avatar", "me.png", "image/png", b"avatar-bytes")],
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/users/register")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let reply = app.send(request).await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["data"]["username"], "alice");
        assert!(reply.body["data"].get("password").is_none());
        assert!(reply.body["data"]["avatar"].as_str().unwrap().starts_with("/media/"));

        let login = app
            .call(
                "POST",
                "/api/v1/users/login",
                None,
                Some(json!({ "email": "alice@example.com", "password": "wonderland" })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK);
        assert!(login.body["data"]["accessToken"].is_string());
        let cookies: Vec<_> = login.headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);

        let wrong = app
            .call(
                "POST",
                "/api/v1/users/login",
                None,
                Some(json!({ "username": "alice", "password": "nope" })),
            )
            .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.body["message"], "Invalid user credentials");
    }

    #[tokio::test]
    async fn register_validates_fields_and_duplicates() {
        let app = app();
        app.user("bob");

        let (content_type, body) = multipart(
            &[
                ("fullName", "Bob"),
                ("email", "new@example.com"),
                ("username", "bob"),
                ("password", "pw"),
            ],
            &[("avatar", "a.png", "image/png", b"x")],
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/users/register")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        assert_eq!(app.send(request).await.status, StatusCode::CONFLICT);

        let (content_type, body) = multipart(
            &[
                ("fullName", "Carol"),
                ("email", "carol@example.com"),
                ("username", "carol"),
                ("password", "pw"),
            ],
            &[],
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/users/register")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let reply = app.send(request).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["message"], "Avatar file is required");

        for bad in ["bad/name", "two words", "émile"] {
            let (content_type, body) = multipart(
                &[
                    ("fullName", "Dana"),
                    ("email", "dana@example.com"),
                    ("username", bad),
                    ("password", "pw"),
                ],
                &[("avatar", "a.png", "image/png", b"x")],
            );
            let request = Request::builder()
                .method("POST")
                .uri("/api/v1/users/register")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap();
            let reply = app.send(request).await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{bad}");
            assert!(reply.body["message"].as_str().unwrap().starts_with("Username may only"));
        }
    }

    #[tokio::test]
    async fn refresh_rotation_invalidates_previous_token() {
        let app = app();
        app.user("dana");
        let login = app
            .call(
                "POST",
                "/api/v1/users/login",
                None,
                Some(json!({ "username": "dana", "password": "secret-pass" })),
            )
            .await;
        let first = login.body["data"]["refreshToken"].as_str().unwrap().to_string();

        let rotated = app
            .call(
                "POST",
                "/api/v1/users/refresh-token",
                None,
                Some(json!({ "refreshToken": first })),
            )
            .await;
        assert_eq!(rotated.status, StatusCode::OK);
        let second = rotated.body["data"]["refreshToken"].as_str().unwrap();
        assert_ne!(second, first);

        let replay = app
            .call(
                "POST",
                "/api/v1/users/refresh-token",
                None,
                Some(json!({ "refreshToken": first })),
            )
            .await;
        assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
        assert_eq!(replay.body["message"], "Refresh token is expired or used");

        let missing = app
            .call("POST", "/api/v1/users/refresh-token", None, None)
            .await;
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_revokes_refresh_and_auth_is_required() {
        let app = app();
        let (user, token) = app.user("erin");
        app.state
            .db
            .set_refresh_token(&user.id, Some("stored"))
            .unwrap();

        let reply = app.call("POST", "/api/v1/users/logout", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let creds = app.state.db.find_credentials(&user.id).unwrap().unwrap();
        assert!(creds.refresh_token.is_none());

        let anonymous = app.call("GET", "/api/v1/users/current-user", None, None).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        let bogus = app
            .call("GET", "/api/v1/users/current-user", Some("not-a-jwt"), None)
            .await;
        assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_checks_old_password() {
        let app = app();
        let (_, token) = app.user("finn");
        let wrong = app
            .call(
                "POST",
                "/api/v1/users/change-password",
                Some(&token),
                Some(json!({ "oldPassword": "nope", "newPassword": "fresh" })),
            )
            .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

        let ok = app
            .call(
                "POST",
                "/api/v1/users/change-password",
                Some(&token),
                Some(json!({ "oldPassword": "secret-pass", "newPassword": "fresh" })),
            )
            .await;
        assert_eq!(ok.status, StatusCode::OK);

        let login = app
            .call(
                "POST",
                "/api/v1/users/login",
                None,
                Some(json!({ "username": "finn", "password": "fresh" })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_account_and_channel_profile() {
        let app = app();
        let (_, alice_token) = app.user("alice");
        let (bob, _) = app.user("bob");

        let taken = app
            .call(
                "PATCH",
                "/api/v1/users/update-account",
                Some(&alice_token),
                Some(json!({ "fullName": "A", "email": bob.email })),
            )
            .await;
        assert_eq!(taken.status, StatusCode::CONFLICT);

        let updated = app
            .call(
                "PATCH",
                "/api/v1/users/update-account",
                Some(&alice_token),
                Some(json!({ "fullName": "Alice L", "email": "ALICE@new.example" })),
            )
            .await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.body["data"]["email"], "alice@new.example");

        let profile = app.call("GET", "/api/v1/users/c/bob", None, None).await;
        assert_eq!(profile.status, StatusCode::OK);
        assert_eq!(profile.body["data"]["isSubscribed"], false);

        let missing = app.call("GET", "/api/v1/users/c/ghost", None, None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.body["message"], "Channel does not exist");
    }
}
