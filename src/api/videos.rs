use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use super::auth::{CurrentUser, MaybeUser};
use super::error::{ApiError, ApiResult};
use super::extract::{ApiQuery, UploadForm, required};
use super::response::{ApiResponse, Empty};
use super::{AppState, ensure_id, ensure_owner};
use crate::media::MediaKind;
use crate::models::{
    NewVideo, PageMeta, Pagination, SortOrder, VideoRecord, VideoSort, VideoUpdate, VideoView,
};
use crate::store::{VideoQuery, is_valid_id};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    query: Option<String>,
    sort_by: Option<String>,
    sort_type: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoList {
    videos: Vec<VideoView>,
    meta: PageMeta,
}

pub async fn list(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<ApiResponse<VideoList>> {
    let page = Pagination::new(params.page, params.limit);
    let query = VideoQuery {
        search: params
            .query
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        owner: params.user_id.filter(|id| is_valid_id(id)),
        sort: VideoSort::parse(params.sort_by.as_deref()),
        order: SortOrder::parse(params.sort_type.as_deref()),
        page,
    };
    let (videos, total) = state.run(move |db| Ok(db.list_videos(&query)?)).await?;
    Ok(ApiResponse::ok(
        VideoList {
            videos,
            meta: page.meta(total),
        },
        "Videos fetched successfully",
    ))
}

pub async fn publish(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let title = required(form.text("title"), "Title")?;
    let description = required(form.text("description"), "Description")?;
    let video_file = form
        .take_file("videoFile")
        .ok_or_else(|| ApiError::bad_request("Video file is required"))?;
    let thumbnail = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::bad_request("Thumbnail is required"))?;

    let media = state.media.clone();
    let video = state
        .run(move |db| {
            let stored_video = media.store(MediaKind::Video, &video_file)?;
            let stored_thumbnail = media.store(MediaKind::Image, &thumbnail)?;
            Ok(db.insert_video(NewVideo {
                title,
                description,
                video_file: stored_video.url,
                thumbnail: stored_thumbnail.url,
                duration: stored_video.duration.unwrap_or(0.0),
                owner: user.id,
            })?)
        })
        .await?;

    tracing::info!(video = %video.id, owner = %video.owner, "published video");
    Ok(ApiResponse::created(video, "Video published successfully"))
}

/// Signed-in viewers count as a view and get the video added to their
/// history; guests get a preview flag instead.
pub async fn get_one(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<VideoView>> {
    ensure_id(&video_id, "video")?;
    let video = state
        .run(move |db| {
            let video = db
                .find_video_view(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            let is_owner = viewer
                .as_ref()
                .is_some_and(|viewer| viewer.id == video.owner.id);
            if !video.is_published && !is_owner {
                return Err(ApiError::not_found("Video not found"));
            }

            let Some(viewer) = viewer else {
                return Ok(VideoView {
                    is_preview_mode: Some(true),
                    ..video
                });
            };
            db.record_view(&video_id, &viewer.id)?;
            let mut video = db
                .find_video_view(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            video.is_preview_mode = Some(false);
            Ok(video)
        })
        .await?;
    Ok(ApiResponse::ok(video, "Video fetched successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<VideoView>> {
    ensure_id(&video_id, "video")?;
    let title = form.text("title").map(str::to_owned);
    let description = form.text("description").map(str::to_owned);
    let thumbnail = form.take_file("thumbnail");
    if title.is_none() && description.is_none() && thumbnail.is_none() {
        return Err(ApiError::bad_request(
            "At least one of title, description or thumbnail is required",
        ));
    }

    let media = state.media.clone();
    let video = state
        .run(move |db| {
            let existing = db
                .find_video(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to update this video",
            )?;
            let thumbnail = match thumbnail {
                Some(upload) => Some(media.store(MediaKind::Image, &upload)?.url),
                None => None,
            };
            db.update_video(
                &video_id,
                &VideoUpdate {
                    title,
                    description,
                    thumbnail,
                },
            )?
            .ok_or_else(|| ApiError::not_found("Video not found"))
        })
        .await?;
    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<Empty>> {
    ensure_id(&video_id, "video")?;
    state
        .run(move |db| {
            let existing = db
                .find_video(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to delete this video",
            )?;
            db.delete_video(&video_id)?;
            tracing::info!(video = %video_id, "deleted video");
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(Empty::default(), "Video deleted successfully"))
}

pub async fn toggle_publish(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<VideoRecord>> {
    ensure_id(&video_id, "video")?;
    let video = state
        .run(move |db| {
            let existing = db
                .find_video(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            ensure_owner(
                &existing.owner,
                &user.id,
                "You do not have permission to change this video",
            )?;
            db.set_published(&video_id, !existing.is_published)?
                .ok_or_else(|| ApiError::not_found("Video not found"))
        })
        .await?;
    let message = if video.is_published {
        "Video published successfully"
    } else {
        "Video unpublished successfully"
    };
    Ok(ApiResponse::ok(video, message))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, multipart};
    use crate::models::{LikeTarget, NewVideo};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::json;

    fn seed_video(app: &super::super::test_support::TestApp, owner: &str, title: &str) -> String {
        app.state
            .db
            .insert_video(NewVideo {
                title: title.into(),
                description: "desc".into(),
                video_file: "/media/v.mp4".into(),
                thumbnail: "/media/t.png".into(),
                duration: 3.0,
                owner: owner.into(),
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn publish_with_upload() {
        let app = app();
        let (_, token) = app.user("alice");
        let (content_type, body) = multipart(
            &[("title", "My clip"), ("description", "short one")],
            &[
                ("videoFile", "clip.mp4", "video/mp4", b"frames"),
                ("thumbnail", "thumb.jpg", "image/jpeg", b"jpeg"),
            ],
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/videos")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let reply = app.send(request).await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["data"]["title"], "My clip");
        assert_eq!(reply.body["data"]["isPublished"], true);
        assert!(reply.body["data"]["videoFile"].as_str().unwrap().ends_with(".mp4"));

        let (content_type, body) = multipart(
            &[("title", "No files"), ("description", "x")],
            &[("thumbnail", "thumb.jpg", "image/jpeg", b"jpeg")],
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/videos")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let reply = app.send(request).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["message"], "Video file is required");
    }

    #[tokio::test]
    async fn viewing_counts_for_members_and_previews_for_guests() {
        let app = app();
        let (alice, _) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let id = seed_video(&app, &alice.id, "watch me");
        let uri = format!("/api/v1/videos/{id}");

        let guest = app.call("GET", &uri, None, None).await;
        assert_eq!(guest.status, StatusCode::OK);
        assert_eq!(guest.body["data"]["isPreviewMode"], true);
        assert_eq!(guest.body["data"]["views"], 0);

        let member = app.call("GET", &uri, Some(&bob_token), None).await;
        assert_eq!(member.body["data"]["views"], 1);
        assert_eq!(member.body["data"]["owner"]["username"], "alice");

        let history = app
            .call("GET", "/api/v1/users/history", Some(&bob_token), None)
            .await;
        assert_eq!(history.body["data"][0]["_id"], id.as_str());

        app.state.db.set_published(&id, false).unwrap();
        let history = app
            .call("GET", "/api/v1/users/history", Some(&bob_token), None)
            .await;
        assert!(history.body["data"].as_array().unwrap().is_empty());

        let invalid = app.call("GET", "/api/v1/videos/not-an-id", None, None).await;
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_the_owner_mutates() {
        let app = app();
        let (alice, alice_token) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let id = seed_video(&app, &alice.id, "mine");

        let (content_type, body) = multipart(&[("title", "stolen")], &[]);
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/api/v1/videos/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {bob_token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        assert_eq!(app.send(request).await.status, StatusCode::FORBIDDEN);

        let toggle_uri = format!("/api/v1/videos/toggle/publish/{id}");
        let denied = app.call("PATCH", &toggle_uri, Some(&bob_token), None).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        let delete = app
            .call("DELETE", &format!("/api/v1/videos/{id}"), Some(&bob_token), None)
            .await;
        assert_eq!(delete.status, StatusCode::FORBIDDEN);

        let toggled = app.call("PATCH", &toggle_uri, Some(&alice_token), None).await;
        assert_eq!(toggled.status, StatusCode::OK);
        assert_eq!(toggled.body["message"], "Video unpublished successfully");
        let hidden = app.call("GET", &format!("/api/v1/videos/{id}"), Some(&bob_token), None).await;
        assert_eq!(hidden.status, StatusCode::NOT_FOUND);

        let (content_type, body) = multipart(&[("title", "renamed")], &[]);
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/api/v1/videos/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {alice_token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let reply = app.send(request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["title"], "renamed");
        assert_eq!(reply.body["data"]["description"], "desc");

        let republished = app.call("PATCH", &toggle_uri, Some(&alice_token), None).await;
        assert_eq!(republished.body["message"], "Video published successfully");
        assert_eq!(republished.body["data"]["isPublished"], true);
    }

    #[tokio::test]
    async fn deleting_a_video_removes_comments_and_likes() {
        let app = app();
        let (alice, alice_token) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let id = seed_video(&app, &alice.id, "doomed");

        let comment = app
            .call(
                "POST",
                &format!("/api/v1/comments/{id}"),
                Some(&bob_token),
                Some(json!({ "content": "first" })),
            )
            .await;
        let comment_id = comment.body["data"]["_id"].as_str().unwrap().to_string();
        app.call(
            "POST",
            &format!("/api/v1/likes/toggle/v/{id}"),
            Some(&bob_token),
            None,
        )
        .await;
        app.call(
            "POST",
            &format!("/api/v1/likes/toggle/c/{comment_id}"),
            Some(&alice_token),
            None,
        )
        .await;

        let deleted = app
            .call("DELETE", &format!("/api/v1/videos/{id}"), Some(&alice_token), None)
            .await;
        assert_eq!(deleted.status, StatusCode::OK);

        let db = &app.state.db;
        assert!(db.find_comment(&comment_id).unwrap().is_none());
        assert_eq!(db.like_count(&LikeTarget::Video(id.clone())).unwrap(), 0);
        assert_eq!(db.like_count(&LikeTarget::Comment(comment_id)).unwrap(), 0);

        let gone = app.call("GET", &format!("/api/v1/videos/{id}"), None, None).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_searches_and_pages() {
        let app = app();
        let (alice, _) = app.user("alice");
        seed_video(&app, &alice.id, "Learning Rust");
        seed_video(&app, &alice.id, "Baking bread");

        let reply = app
            .call("GET", "/api/v1/videos?query=RUST&limit=5", None, None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["meta"]["total"], 1);
        assert_eq!(reply.body["data"]["meta"]["limit"], 5);
        assert_eq!(reply.body["data"]["videos"][0]["title"], "Learning Rust");

        let sorted = app
            .call("GET", "/api/v1/videos?sortBy=title&sortType=asc", None, None)
            .await;
        assert_eq!(sorted.body["data"]["videos"][0]["title"], "Baking bread");
    }
}
