use axum::extract::{Path, State};
use serde::Serialize;

use super::auth::CurrentUser;
use super::error::{ApiError, ApiResult};
use super::extract::ApiQuery;
use super::response::ApiResponse;
use super::{AppState, PageParams, ensure_id};
use crate::models::{PageMeta, SubscribedChannel, SubscriberEntry, SubscriptionToggle};

#[derive(Debug, Serialize)]
pub struct SubscriberList {
    subscribers: Vec<SubscriberEntry>,
    meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct ChannelList {
    channels: Vec<SubscribedChannel>,
    meta: PageMeta,
}

pub async fn toggle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(channel_id): Path<String>,
) -> ApiResult<ApiResponse<SubscriptionToggle>> {
    ensure_id(&channel_id, "channel")?;
    if channel_id == user.id {
        return Err(ApiError::bad_request("You cannot subscribe to yourself"));
    }
    let result = state
        .run(move |db| {
            db.find_user(&channel_id)?
                .ok_or_else(|| ApiError::not_found("Channel not found"))?;
            Ok(db.toggle_subscription(&user.id, &channel_id)?)
        })
        .await?;
    let message = if result.subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(result, message))
}

pub async fn subscribers(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<ApiResponse<SubscriberList>> {
    ensure_id(&channel_id, "channel")?;
    let page = params.pagination();
    let (subscribers, total) = state
        .run(move |db| Ok(db.channel_subscribers(&channel_id, page)?))
        .await?;
    Ok(ApiResponse::ok(
        SubscriberList {
            subscribers,
            meta: page.meta(total),
        },
        "Subscribers fetched successfully",
    ))
}

pub async fn channels(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<ApiResponse<ChannelList>> {
    ensure_id(&subscriber_id, "subscriber")?;
    let page = params.pagination();
    let (channels, total) = state
        .run(move |db| Ok(db.subscribed_channels(&subscriber_id, page)?))
        .await?;
    Ok(ApiResponse::ok(
        ChannelList {
            channels,
            meta: page.meta(total),
        },
        "Subscribed channels fetched successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::app;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn subscribing_twice_unsubscribes() {
        let app = app();
        let (alice, alice_token) = app.user("alice");
        let (bob, bob_token) = app.user("bob");
        let uri = format!("/api/v1/subscriptions/c/{}", alice.id);

        let on = app.call("POST", &uri, Some(&bob_token), None).await;
        assert_eq!(on.status, StatusCode::OK);
        assert_eq!(on.body["data"]["subscribed"], true);
        assert_eq!(on.body["data"]["subscribersCount"], 1);

        let subscribers = app.call("GET", &uri, None, None).await;
        assert_eq!(subscribers.body["data"]["meta"]["total"], 1);
        assert_eq!(
            subscribers.body["data"]["subscribers"][0]["subscriber"]["username"],
            "bob"
        );

        let channels = app
            .call("GET", &format!("/api/v1/subscriptions/u/{}", bob.id), None, None)
            .await;
        assert_eq!(channels.body["data"]["channels"][0]["channel"]["username"], "alice");

        let off = app.call("POST", &uri, Some(&bob_token), None).await;
        assert_eq!(off.body["data"]["subscribed"], false);
        assert_eq!(off.body["data"]["subscribersCount"], 0);

        let own = app.call("POST", &uri, Some(&alice_token), None).await;
        assert_eq!(own.status, StatusCode::BAD_REQUEST);
        assert_eq!(own.body["message"], "You cannot subscribe to yourself");
    }

    #[tokio::test]
    async fn unknown_channel_is_404() {
        let app = app();
        let (_, token) = app.user("bob");
        let reply = app
            .call(
                "POST",
                "/api/v1/subscriptions/c/0123456789abcdef01234567",
                Some(&token),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
}
