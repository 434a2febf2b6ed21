use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::auth::CurrentUser;
use super::error::ApiResult;
use super::extract::ApiQuery;
use super::response::ApiResponse;
use crate::models::{ChannelStats, ChannelVideo, PageMeta, Pagination, SortOrder, VideoSort};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParams {
    page: Option<u32>,
    limit: Option<u32>,
    sort_by: Option<String>,
    sort_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardVideos {
    videos: Vec<ChannelVideo>,
    meta: PageMeta,
}

pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<ChannelStats>> {
    let stats = state
        .run(move |db| Ok(db.channel_stats(&user.id)?))
        .await?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

pub async fn videos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(params): ApiQuery<DashboardParams>,
) -> ApiResult<ApiResponse<DashboardVideos>> {
    let page = Pagination::new(params.page, params.limit);
    let sort = VideoSort::parse(params.sort_by.as_deref());
    let order = SortOrder::parse(params.sort_type.as_deref());
    let (videos, total) = state
        .run(move |db| Ok(db.channel_videos(&user.id, page, sort, order)?))
        .await?;
    Ok(ApiResponse::ok(
        DashboardVideos {
            videos,
            meta: page.meta(total),
        },
        "Channel videos fetched successfully",
    ))
}
