use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{ApiClient, Store};
use crate::tokens::TokenPair;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";

/// What the command-line front end remembers between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tokens: None,
        }
    }
}

impl Session {
    /// A missing file is an empty session, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading session {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing session {}", path.display()))
    }

    /// Writes through a temp file in the same directory so a crash never
    /// leaves a truncated session behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let raw = toml::to_string(self).context("encoding session")?;
        let mut tmp = NamedTempFile::new_in(dir).context("creating temp session file")?;
        tmp.write_all(raw.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("writing session {}", path.display()))?;
        Ok(())
    }

    pub fn into_store(self) -> Store {
        Store::new(ApiClient::new(self.base_url).with_tokens(self.tokens))
    }

    /// Captures the store's current tokens, which rotate on refresh.
    pub fn from_store(store: &Store) -> Self {
        Self {
            base_url: store.client().base_url().to_string(),
            tokens: store.client().tokens(),
        }
    }
}
