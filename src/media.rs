//! Upload storage. Handlers hand raw multipart bytes to a [`MediaStorage`]
//! and keep only the returned public URL on the record.
//!
//! [`LocalMediaStorage`] writes each upload once under the BLAKE3 hash of its
//! bytes, so re-uploading the same file is free and names never collide.

use std::{
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};

use mime_guess::{MimeGuess, mime::Mime};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    fn top_level(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub url: String,
    pub file_name: String,
    /// Playback length in seconds when the backend can measure it.
    pub duration: Option<f64>,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    Rejected(String),
    #[error("storing media: {0}")]
    Storage(#[from] std::io::Error),
}

pub trait MediaStorage: Send + Sync {
    fn store(&self, kind: MediaKind, upload: &MediaUpload) -> Result<StoredMedia, MediaError>;

    /// Filesystem location a stored file would have, for backends that serve
    /// media themselves. Pure path arithmetic: callers check that the file
    /// exists. `None` for unsafe names.
    fn local_path(&self, file_name: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct LocalMediaStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl MediaStorage for LocalMediaStorage {
    fn store(&self, kind: MediaKind, upload: &MediaUpload) -> Result<StoredMedia, MediaError> {
        if upload.bytes.is_empty() {
            return Err(MediaError::Rejected("Uploaded file is empty".into()));
        }
        let mime = detect_mime(upload)
            .filter(|mime| mime.type_().as_str() == kind.top_level())
            .ok_or_else(|| {
                MediaError::Rejected(format!("Uploaded file must be a {} file", kind.top_level()))
            })?;

        let digest = blake3::hash(&upload.bytes).to_hex();
        let file_name = match extension_for(upload, &mime) {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest.to_string(),
        };
        let destination = self.root.join(&file_name);

        if !destination.exists() {
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(&upload.bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&destination).map_err(|err| err.error)?;
            tracing::debug!(file = %file_name, bytes = upload.bytes.len(), "stored upload");
        }

        Ok(StoredMedia {
            url: format!("{}/{file_name}", self.public_url),
            file_name,
            duration: None,
        })
    }

    fn local_path(&self, file_name: &str) -> Option<PathBuf> {
        if !is_safe_segment(file_name) {
            return None;
        }
        Some(self.root.join(file_name))
    }
}

/// Declared content type first, then a guess from the file name.
fn detect_mime(upload: &MediaUpload) -> Option<Mime> {
    upload
        .content_type
        .as_deref()
        .and_then(|value| value.parse::<Mime>().ok())
        .filter(|mime| mime.type_() != mime_guess::mime::APPLICATION)
        .or_else(|| {
            upload
                .file_name
                .as_deref()
                .and_then(|name| MimeGuess::from_path(name).first())
        })
}

fn extension_for(upload: &MediaUpload, mime: &Mime) -> Option<String> {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);
    from_name.or_else(|| {
        mime_guess::get_mime_extensions(mime)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}

/// A single path component that cannot escape the media root.
pub fn is_safe_segment(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}
