use std::io::SeekFrom;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use mime_guess::MimeGuess;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

use super::AppState;
use super::error::{ApiError, ApiResult};

/// Streams a stored upload, honouring a single `Range: bytes=` request.
pub async fn serve(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = state
        .media
        .local_path(&file)
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file())
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    let size = metadata.len();

    let mut file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;

    let range = headers
        .get(header::RANGE)
        .and_then(|value| parse_range_header(value, size));

    let mut response = match range {
        Some((start, _)) if start >= size => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, header_value(format!("bytes */{size}"))?);
            response
        }
        Some((start, end)) => {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| ApiError::from(anyhow::Error::new(err)))?;
            let body = Body::from_stream(ReaderStream::new(file.take(length)));
            let mut response = body.into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {start}-{end}/{size}"))?,
            );
            headers.insert(header::CONTENT_LENGTH, header_value(length.to_string())?);
            response
        }
        None => {
            let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, header_value(size.to_string())?);
            response
        }
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    Ok(response)
}

fn header_value(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| ApiError::from(anyhow::Error::new(err)))
}

/// Parses `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. Anything
/// else is ignored and the whole file is served.
fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?.trim();
    let range = value.strip_prefix("bytes=")?.trim();
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        return Some((size.saturating_sub(suffix_len), size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    (end >= start).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::app;
    use super::*;
    use crate::media::{MediaKind, MediaUpload};
    use axum::http::Request;

    #[test]
    fn range_forms() {
        let value = |raw: &'static str| HeaderValue::from_static(raw);
        assert_eq!(parse_range_header(&value("bytes=0-9"), 100), Some((0, 9)));
        assert_eq!(parse_range_header(&value("bytes=90-"), 100), Some((90, 99)));
        assert_eq!(parse_range_header(&value("bytes=-10"), 100), Some((90, 99)));
        assert_eq!(parse_range_header(&value("bytes=-500"), 100), Some((0, 99)));
        assert_eq!(parse_range_header(&value("bytes=9-3"), 100), None);
        assert_eq!(parse_range_header(&value("items=0-1"), 100), None);
    }

    #[tokio::test]
    async fn serves_partial_content() {
        let app = app();
        let stored = app
            .state
            .media
            .store(
                MediaKind::Image,
                &MediaUpload {
                    file_name: Some("pic.png".into()),
                    content_type: Some("image/png".into()),
                    bytes: b"0123456789".to_vec(),
                },
            )
            .unwrap();

        let request = Request::builder()
            .uri(format!("/media/{}", stored.file_name))
            .header("range", "bytes=2-4")
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app.router.clone(), request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-4/10");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"234");

        let missing = app.call("GET", "/media/..%2Fsecret", None, None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_regular_files_are_served() {
        let app = app();
        let missing = app.call("GET", "/media/nothing-here.png", None, None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.body["message"], "File not found");

        let folder = app.state.media.local_path("folder").unwrap();
        tokio::fs::create_dir(&folder).await.unwrap();
        let listed = app.call("GET", "/media/folder", None, None).await;
        assert_eq!(listed.status, StatusCode::NOT_FOUND);
    }
}
