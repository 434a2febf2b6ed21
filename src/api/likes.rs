use axum::extract::{Path, State};
use serde::Serialize;

use super::auth::CurrentUser;
use super::error::{ApiError, ApiResult};
use super::extract::ApiQuery;
use super::response::ApiResponse;
use super::{AppState, PageParams, ensure_id, visible_video};
use crate::models::{LikeTarget, LikeToggle, LikedVideo, PageMeta};

#[derive(Debug, Serialize)]
pub struct LikedVideos {
    likes: Vec<LikedVideo>,
    meta: PageMeta,
}

pub async fn toggle_video(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<LikeToggle>> {
    ensure_id(&video_id, "video")?;
    toggle(state, user, LikeTarget::Video(video_id)).await
}

pub async fn toggle_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<LikeToggle>> {
    ensure_id(&comment_id, "comment")?;
    toggle(state, user, LikeTarget::Comment(comment_id)).await
}

pub async fn toggle_tweet(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<LikeToggle>> {
    ensure_id(&tweet_id, "tweet")?;
    toggle(state, user, LikeTarget::Tweet(tweet_id)).await
}

async fn toggle(
    state: AppState,
    CurrentUser(user): CurrentUser,
    target: LikeTarget,
) -> ApiResult<ApiResponse<LikeToggle>> {
    let (result, noun) = state
        .run(move |db| {
            let noun = match &target {
                LikeTarget::Video(id) => {
                    visible_video(&db, id, Some(&user.id))?;
                    "Video"
                }
                LikeTarget::Comment(id) => {
                    let comment = db
                        .find_comment(id)?
                        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
                    let on_visible_video = db
                        .find_video(&comment.video)?
                        .is_some_and(|video| video.is_published || video.owner == user.id);
                    if !on_visible_video {
                        return Err(ApiError::not_found("Comment not found"));
                    }
                    "Comment"
                }
                LikeTarget::Tweet(id) => {
                    db.find_tweet(id)?
                        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
                    "Tweet"
                }
            };
            Ok((db.toggle_like(&target, &user.id)?, noun))
        })
        .await?;

    let message = if result.liked {
        format!("{noun} liked")
    } else {
        format!("{noun} unliked")
    };
    Ok(ApiResponse::ok(result, message))
}

pub async fn liked_videos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<ApiResponse<LikedVideos>> {
    let page = params.pagination();
    let (likes, total) = state
        .run(move |db| Ok(db.liked_videos(&user.id, page)?))
        .await?;
    Ok(ApiResponse::ok(
        LikedVideos {
            likes,
            meta: page.meta(total),
        },
        "Liked videos fetched successfully",
    ))
}
