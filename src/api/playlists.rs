use axum::extract::{Path, State};
use serde::Deserialize;

use super::auth::{CurrentUser, MaybeUser};
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, required};
use super::response::{ApiResponse, Empty};
use super::{AppState, ensure_id, ensure_owner, visible_video};
use crate::models::{PlaylistRecord, PlaylistView};
use crate::store::Database;

#[derive(Debug, Deserialize)]
pub struct PlaylistBody {
    name: Option<String>,
    description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<PlaylistBody>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let name = required(body.name.as_deref(), "Name")?;
    let description = required(body.description.as_deref(), "Description")?;
    let playlist = state
        .run(move |db| Ok(db.insert_playlist(&user.id, &name, &description)?))
        .await?;
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(user_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<PlaylistView>>> {
    ensure_id(&user_id, "user")?;
    let playlists = state
        .run(move |db| {
            db.find_user(&user_id)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            let viewer = viewer.as_ref().map(|user| user.id.as_str());
            Ok(db.user_playlists(&user_id, viewer)?)
        })
        .await?;
    Ok(ApiResponse::ok(playlists, "Playlists fetched successfully"))
}

pub async fn get_one(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<PlaylistView>> {
    ensure_id(&playlist_id, "playlist")?;
    let playlist = state
        .run(move |db| {
            db.playlist_view(&playlist_id, viewer.as_ref().map(|user| user.id.as_str()))?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<String>,
    ApiJson(body): ApiJson<PlaylistBody>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    ensure_id(&playlist_id, "playlist")?;
    let name = trimmed(body.name);
    let description = trimmed(body.description);
    if name.is_none() && description.is_none() {
        return Err(ApiError::bad_request(
            "Name or description is required",
        ));
    }

    let playlist = state
        .run(move |db| {
            owned_playlist(&db, &playlist_id, &user.id)?;
            db.update_playlist(&playlist_id, name.as_deref(), description.as_deref())?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<Empty>> {
    ensure_id(&playlist_id, "playlist")?;
    state
        .run(move |db| {
            owned_playlist(&db, &playlist_id, &user.id)?;
            db.delete_playlist(&playlist_id)?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(Empty::default(), "Playlist deleted successfully"))
}

pub async fn add_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    ensure_id(&video_id, "video")?;
    ensure_id(&playlist_id, "playlist")?;
    let playlist = state
        .run(move |db| {
            owned_playlist(&db, &playlist_id, &user.id)?;
            visible_video(&db, &video_id, Some(&user.id))?;
            if !db.add_playlist_video(&playlist_id, &video_id)? {
                return Err(ApiError::bad_request("Video already in playlist"));
            }
            db.find_playlist(&playlist_id)?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Video added to playlist"))
}

pub async fn remove_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    ensure_id(&video_id, "video")?;
    ensure_id(&playlist_id, "playlist")?;
    let playlist = state
        .run(move |db| {
            owned_playlist(&db, &playlist_id, &user.id)?;
            if !db.remove_playlist_video(&playlist_id, &video_id)? {
                return Err(ApiError::bad_request("Video not in playlist"));
            }
            db.find_playlist(&playlist_id)?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Video removed from playlist"))
}

fn owned_playlist(db: &Database, playlist_id: &str, user_id: &str) -> ApiResult<PlaylistRecord> {
    let playlist = db
        .find_playlist(playlist_id)?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    ensure_owner(
        &playlist.owner,
        user_id,
        "You do not have permission to modify this playlist",
    )?;
    Ok(playlist)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::app;
    use crate::models::NewVideo;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn playlist_membership_round() {
        let app = app();
        let (alice, alice_token) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let video = app
            .state
            .db
            .insert_video(NewVideo {
                title: "track".into(),
                description: "d".into(),
                video_file: "/media/v.mp4".into(),
                thumbnail: "/media/t.png".into(),
                duration: 30.0,
                owner: alice.id.clone(),
            })
            .unwrap();

        let created = app
            .call(
                "POST",
                "/api/v1/playlist",
                Some(&alice_token),
                Some(json!({ "name": "mix", "description": "favourites" })),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let playlist_id = created.body["data"]["_id"].as_str().unwrap().to_string();
        let add_uri = format!("/api/v1/playlist/add/{}/{playlist_id}", video.id);
        let remove_uri = format!("/api/v1/playlist/remove/{}/{playlist_id}", video.id);

        let stranger = app.call("PATCH", &add_uri, Some(&bob_token), None).await;
        assert_eq!(stranger.status, StatusCode::FORBIDDEN);

        let added = app.call("PATCH", &add_uri, Some(&alice_token), None).await;
        assert_eq!(added.status, StatusCode::OK);
        assert_eq!(added.body["data"]["videos"][0], video.id.as_str());
        let again = app.call("PATCH", &add_uri, Some(&alice_token), None).await;
        assert_eq!(again.status, StatusCode::BAD_REQUEST);
        assert_eq!(again.body["message"], "Video already in playlist");

        let view = app
            .call("GET", &format!("/api/v1/playlist/{playlist_id}"), None, None)
            .await;
        assert_eq!(view.body["data"]["totalVideos"], 1);
        assert_eq!(view.body["data"]["videos"][0]["title"], "track");
        assert_eq!(view.body["data"]["owner"]["username"], "alice");

        let removed = app.call("PATCH", &remove_uri, Some(&alice_token), None).await;
        assert_eq!(removed.status, StatusCode::OK);
        let missing = app.call("PATCH", &remove_uri, Some(&alice_token), None).await;
        assert_eq!(missing.body["message"], "Video not in playlist");

        let listed = app
            .call("GET", &format!("/api/v1/playlist/user/{}", alice.id), None, None)
            .await;
        assert_eq!(listed.body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unpublished_videos_stay_out_of_other_playlists() {
        let app = app();
        let (alice, alice_token) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let video = app
            .state
            .db
            .insert_video(NewVideo {
                title: "private cut".into(),
                description: "d".into(),
                video_file: "/media/secret.mp4".into(),
                thumbnail: "/media/t.png".into(),
                duration: 30.0,
                owner: alice.id.clone(),
            })
            .unwrap();
        app.state.db.set_published(&video.id, false).unwrap();

        let mut ids = Vec::new();
        for token in [&alice_token, &bob_token] {
            let created = app
                .call(
                    "POST",
                    "/api/v1/playlist",
                    Some(token.as_str()),
                    Some(json!({ "name": "mix", "description": "d" })),
                )
                .await;
            ids.push(created.body["data"]["_id"].as_str().unwrap().to_string());
        }

        let foreign = app
            .call(
                "PATCH",
                &format!("/api/v1/playlist/add/{}/{}", video.id, ids[1]),
                Some(&bob_token),
                None,
            )
            .await;
        assert_eq!(foreign.status, StatusCode::NOT_FOUND);
        assert_eq!(foreign.body["message"], "Video not found");

        let own = app
            .call(
                "PATCH",
                &format!("/api/v1/playlist/add/{}/{}", video.id, ids[0]),
                Some(&alice_token),
                None,
            )
            .await;
        assert_eq!(own.status, StatusCode::OK);

        let uri = format!("/api/v1/playlist/{}", ids[0]);
        let owner_view = app.call("GET", &uri, Some(&alice_token), None).await;
        assert_eq!(owner_view.body["data"]["totalVideos"], 1);
        let bob_view = app.call("GET", &uri, Some(&bob_token), None).await;
        assert_eq!(bob_view.body["data"]["totalVideos"], 0);
        assert!(bob_view.body["data"]["videos"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_needs_a_field_and_delete_is_owner_only() {
        let app = app();
        let (_, alice_token) = app.user("alice");
        let (_, bob_token) = app.user("bob");
        let created = app
            .call(
                "POST",
                "/api/v1/playlist",
                Some(&alice_token),
                Some(json!({ "name": "mix", "description": "d" })),
            )
            .await;
        let uri = format!(
            "/api/v1/playlist/{}",
            created.body["data"]["_id"].as_str().unwrap()
        );

        let empty = app
            .call("PATCH", &uri, Some(&alice_token), Some(json!({ "name": " " })))
            .await;
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);

        let renamed = app
            .call("PATCH", &uri, Some(&alice_token), Some(json!({ "name": "road trip" })))
            .await;
        assert_eq!(renamed.body["data"]["name"], "road trip");
        assert_eq!(renamed.body["data"]["description"], "d");

        let denied = app.call("DELETE", &uri, Some(&bob_token), None).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        let deleted = app.call("DELETE", &uri, Some(&alice_token), None).await;
        assert_eq!(deleted.status, StatusCode::OK);
        let gone = app.call("GET", &uri, None, None).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = app();
        let (_, token) = app.user("alice");
        let reply = app
            .call("POST", "/api/v1/playlist", Some(&token), Some(json!({ "name": "only" })))
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["message"], "Description is required");
    }
}
