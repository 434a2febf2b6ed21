use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use super::auth::CurrentUser;
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiQuery, required};
use super::response::{ApiResponse, Empty};
use super::{AppState, PageParams, ensure_id, ensure_owner};
use crate::models::{PageMeta, TweetRecord, TweetView};

#[derive(Debug, Deserialize)]
pub struct TweetBody {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TweetList {
    tweets: Vec<TweetView>,
    meta: PageMeta,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<TweetBody>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    let content = required(body.content.as_deref(), "Content")?;
    let tweet = state
        .run(move |db| Ok(db.insert_tweet(&user.id, &content)?))
        .await?;
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<ApiResponse<TweetList>> {
    ensure_id(&user_id, "user")?;
    let page = params.pagination();
    let (tweets, total) = state
        .run(move |db| {
            db.find_user(&user_id)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            Ok(db.user_tweets(&user_id, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(
        TweetList {
            tweets,
            meta: page.meta(total),
        },
        "Tweets fetched successfully",
    ))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tweet_id): Path<String>,
    ApiJson(body): ApiJson<TweetBody>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    ensure_id(&tweet_id, "tweet")?;
    let content = required(body.content.as_deref(), "Content")?;
    let tweet = state
        .run(move |db| {
            let existing = db
                .find_tweet(&tweet_id)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to update this tweet",
            )?;
            db.update_tweet(&tweet_id, &content)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))
        })
        .await?;
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<Empty>> {
    ensure_id(&tweet_id, "tweet")?;
    state
        .run(move |db| {
            let existing = db
                .find_tweet(&tweet_id)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to delete this tweet",
            )?;
            db.delete_tweet(&tweet_id)?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(Empty::default(), "Tweet deleted successfully"))
}
