use axum::extract::{Path, State};
use serde::Deserialize;

use super::auth::{CurrentUser, MaybeUser};
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiQuery, required};
use super::response::{ApiResponse, Empty};
use super::{AppState, PageParams, ensure_id, ensure_owner, visible_video};
use crate::models::{CommentRecord, CommentView, PaginatedDocs};

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    content: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(video_id): Path<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<ApiResponse<PaginatedDocs<CommentView>>> {
    ensure_id(&video_id, "video")?;
    let page = params.pagination();
    let (comments, total) = state
        .run(move |db| {
            visible_video(&db, &video_id, viewer.as_ref().map(|user| user.id.as_str()))?;
            Ok(db.list_comments(&video_id, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(
        page.docs(comments, total),
        "Comments fetched successfully",
    ))
}

pub async fn add(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<ApiResponse<CommentRecord>> {
    ensure_id(&video_id, "video")?;
    let content = required(body.content.as_deref(), "Content")?;
    let comment = state
        .run(move |db| {
            visible_video(&db, &video_id, Some(&user.id))?;
            Ok(db.insert_comment(&video_id, &user.id, &content)?)
        })
        .await?;
    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<String>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<ApiResponse<CommentRecord>> {
    ensure_id(&comment_id, "comment")?;
    let content = required(body.content.as_deref(), "Content")?;
    let comment = state
        .run(move |db| {
            let existing = db
                .find_comment(&comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to update this comment",
            )?;
            db.update_comment(&comment_id, &content)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))
        })
        .await?;
    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

/// The comment's author or the owner of the video may delete it.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<Empty>> {
    ensure_id(&comment_id, "comment")?;
    state
        .run(move |db| {
            let existing = db
                .find_comment(&comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;
            let video_owner = db.find_video(&existing.video)?.map(|video| video.owner);
            if existing.owner != user.id && video_owner.as_deref() != Some(user.id.as_str()) {
                return Err(ApiError::forbidden(
                    "You do not have permission to delete this comment",
                ));
            }
            db.delete_comment(&comment_id)?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(Empty::default(), "Comment deleted successfully"))
}
