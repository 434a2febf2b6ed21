//! Request authentication. The access token comes from the `accessToken`
//! cookie or an `Authorization: Bearer` header; a valid token must still
//! name an existing user.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::models::UserRecord;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The authenticated caller. Rejects with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

/// The caller if a valid token was presented; guests get `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserRecord>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = access_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
        let user = resolve_user(state, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;
        Ok(CurrentUser(user))
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match access_token(&parts.headers) {
            Some(token) => Ok(MaybeUser(resolve_user(state, &token).await?)),
            None => Ok(MaybeUser(None)),
        }
    }
}

async fn resolve_user(state: &AppState, token: &str) -> ApiResult<Option<UserRecord>> {
    let claims = match state.tokens.verify_access(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "rejected access token");
            return Ok(None);
        }
    };
    state.run(move |db| Ok(db.find_user(&claims.id)?)).await
}

fn access_token(headers: &HeaderMap) -> Option<String> {
    cookie(headers, ACCESS_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    })
}

/// Value of the named cookie across all `Cookie` headers.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for an HttpOnly token cookie. Secure cookies are sent
/// cross-site (`SameSite=None`); plain ones stay `Lax` for local setups.
pub fn token_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> ApiResult<HeaderValue> {
    let site = if secure { "; Secure; SameSite=None" } else { "; SameSite=Lax" };
    HeaderValue::from_str(&format!(
        "{name}={value}; Path=/; HttpOnly; Max-Age={max_age_secs}{site}"
    ))
    .map_err(|err| ApiError::from(anyhow::Error::new(err)))
}

pub fn clear_cookie(name: &str, secure: bool) -> ApiResult<HeaderValue> {
    token_cookie(name, "", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=abc.def; other=1"),
        );
        assert_eq!(cookie(&headers, ACCESS_COOKIE).as_deref(), Some("abc.def"));
        assert_eq!(cookie(&headers, REFRESH_COOKIE), None);
    }

    #[test]
    fn bearer_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(access_token(&headers).as_deref(), Some("tok"));

        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=fromcookie"));
        assert_eq!(access_token(&headers).as_deref(), Some("fromcookie"));
    }

    #[test]
    fn cookies_follow_secure_setting() {
        let secure = token_cookie(ACCESS_COOKIE, "t", 60, true).unwrap();
        let secure = secure.to_str().unwrap();
        assert!(secure.contains("HttpOnly"));
        assert!(secure.contains("Secure; SameSite=None"));

        let cleared = clear_cookie(REFRESH_COOKIE, false).unwrap();
        assert_eq!(
            cleared.to_str().unwrap(),
            "refreshToken=; Path=/; HttpOnly; Max-Age=0; SameSite=Lax"
        );
    }
}
