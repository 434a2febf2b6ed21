//! Extractors whose rejections render as envelope errors instead of axum's
//! plain-text bodies.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Multipart, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiResult};
use crate::media::MediaUpload;

pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
    }
}

pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
    }
}

/// A fully buffered multipart form: text fields and file fields by name.
#[derive(Debug, Default)]
pub struct UploadForm {
    text: HashMap<String, String>,
    files: HashMap<String, MediaUpload>,
}

impl UploadForm {
    /// Trimmed text value; blank counts as missing.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<MediaUpload> {
        self.files.remove(name)
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
        {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.body_text()))?;

            match file_name {
                Some(file_name) if !bytes.is_empty() => {
                    form.files.insert(
                        name,
                        MediaUpload {
                            file_name: Some(file_name),
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                Some(_) => {}
                None => {
                    form.text
                        .insert(name, String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        Ok(form)
    }
}

/// Returns the trimmed value or a 400 naming the field.
pub fn required(value: Option<&str>, label: &str) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::bad_request(format!("{label} is required")))
}
