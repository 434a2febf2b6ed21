use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::media::MediaError;
use crate::store::is_unique_violation;

/// Error half of the response envelope. Internal failures are logged where
/// they are converted and reach the client only as a generic message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Vec<String>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 409 with `message` when a write lost a race on a UNIQUE index;
    /// any other failure stays internal.
    pub fn conflict_or_internal(err: anyhow::Error, message: &str) -> Self {
        if is_unique_violation(&err) {
            Self::conflict(message)
        } else {
            Self::from(err)
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "request failed");
        Self::internal("Internal server error")
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "blocking task failed");
        Self::internal("Internal server error")
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Rejected(message) => Self::bad_request(message),
            MediaError::Storage(source) => {
                tracing::error!(error = %source, "storing upload failed");
                Self::internal("Error while uploading file")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "statusCode": self.status.as_u16(),
            "data": null,
            "message": self.message,
            "success": false,
            "errors": self.errors,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_failure_envelope() {
        let response = ApiError::conflict("taken")
            .with_errors(vec!["username".into()])
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["statusCode"], 409);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "taken");
        assert!(body["data"].is_null());
        assert_eq!(body["errors"][0], "username");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("disk"));
    }

    #[test]
    fn lost_unique_races_become_conflicts() {
        let (_dir, db) = crate::store::test_support::temp_db();
        let alice = crate::store::test_support::user(&db, "alice");
        let bob = crate::store::test_support::user(&db, "bob");

        let err = db.update_account(&bob.id, "Bob", &alice.email).unwrap_err();
        let mapped = ApiError::conflict_or_internal(err, "Email is already in use");
        assert_eq!(mapped.status, StatusCode::CONFLICT);
        assert_eq!(mapped.message, "Email is already in use");

        let other = ApiError::conflict_or_internal(anyhow::anyhow!("disk full"), "taken");
        assert_eq!(other.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejected_media_is_a_client_error() {
        let err = ApiError::from(MediaError::Rejected("bad type".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "bad type");
    }
}
