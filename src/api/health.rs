use serde_json::{Value, json};

use super::response::ApiResponse;

pub async fn healthcheck() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "OK" }), "Service is healthy")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::app;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let app = app();
        let reply = app.call("GET", "/api/v1/healthcheck", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["status"], "OK");
        assert_eq!(reply.body["success"], true);
    }

    #[tokio::test]
    async fn unknown_routes_use_the_envelope() {
        let app = app();
        let reply = app.call("GET", "/api/v1/nope", None, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["success"], false);
    }
}
