use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/videotube-env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_MEDIA_ROOT: &str = "/var/lib/videotube";
pub const DEFAULT_PUBLIC_MEDIA_URL: &str = "/media";
pub const DEFAULT_CORS_ORIGIN: &str = "*";
pub const DEFAULT_ACCESS_TOKEN_EXPIRY: &str = "1d";
pub const DEFAULT_REFRESH_TOKEN_EXPIRY: &str = "10d";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const DATABASE_FILE: &str = "videotube.db";

/// Raw key/value pairs read from the env file. Keys keep their spelling so
/// process environment variables can shadow them one-to-one.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    values: HashMap<String, String>,
}

impl EnvConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_path: PathBuf,
    pub media_root: PathBuf,
    pub public_media_url: String,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
    pub cookie_secure: bool,
    pub tokens: TokenSettings,
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    Ok(Some(parse_env_config(&content)))
}

fn parse_env_config(content: &str) -> EnvConfig {
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if !value.is_empty() {
                cfg.insert(key.trim(), value);
            }
        }
    }
    cfg
}

/// Builds the runtime configuration from the env file at `path` (optional)
/// overlaid with the process environment.
pub fn load_server_config_from(path: impl AsRef<Path>) -> Result<ServerConfig> {
    let path = path.as_ref();
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    for (key, value) in std::env::vars() {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            cfg.insert(key, trimmed);
        }
    }
    resolve_server_config(&cfg)
}

pub fn resolve_server_config(cfg: &EnvConfig) -> Result<ServerConfig> {
    let host = cfg
        .get("VIDEOTUBE_HOST")
        .unwrap_or(DEFAULT_HOST)
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for VIDEOTUBE_HOST")?;
    let port = match cfg.get("VIDEOTUBE_PORT") {
        Some(value) => value
            .parse::<u16>()
            .context("expected a numeric VIDEOTUBE_PORT between 0 and 65535")?,
        None => DEFAULT_PORT,
    };
    let media_root = PathBuf::from(cfg.get("MEDIA_ROOT").unwrap_or(DEFAULT_MEDIA_ROOT));
    let database_path = cfg
        .get("DATABASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| media_root.join(DATABASE_FILE));
    let public_media_url = cfg
        .get("PUBLIC_MEDIA_URL")
        .unwrap_or(DEFAULT_PUBLIC_MEDIA_URL)
        .trim_end_matches('/')
        .to_string();
    let max_upload_bytes = match cfg.get("MAX_UPLOAD_BYTES") {
        Some(value) => value.parse::<usize>().context("parsing MAX_UPLOAD_BYTES")?,
        None => DEFAULT_MAX_UPLOAD_BYTES,
    };
    let cookie_secure = match cfg.get("COOKIE_SECURE") {
        Some(value) => parse_bool(value).context("parsing COOKIE_SECURE")?,
        None => true,
    };

    let tokens = TokenSettings {
        access_secret: required(cfg, "ACCESS_TOKEN_SECRET")?,
        access_ttl: parse_expiry(
            cfg.get("ACCESS_TOKEN_EXPIRY")
                .unwrap_or(DEFAULT_ACCESS_TOKEN_EXPIRY),
        )
        .context("parsing ACCESS_TOKEN_EXPIRY")?,
        refresh_secret: required(cfg, "REFRESH_TOKEN_SECRET")?,
        refresh_ttl: parse_expiry(
            cfg.get("REFRESH_TOKEN_EXPIRY")
                .unwrap_or(DEFAULT_REFRESH_TOKEN_EXPIRY),
        )
        .context("parsing REFRESH_TOKEN_EXPIRY")?,
    };
    if tokens.access_secret == tokens.refresh_secret {
        bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
    }

    Ok(ServerConfig {
        host,
        port,
        database_path,
        media_root,
        public_media_url,
        cors_origin: cfg
            .get("CORS_ORIGIN")
            .unwrap_or(DEFAULT_CORS_ORIGIN)
            .to_string(),
        max_upload_bytes,
        cookie_secure,
        tokens,
    })
}

fn required(cfg: &EnvConfig, key: &str) -> Result<String> {
    cfg.get(key)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{key} must be set in the environment or config file"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// Parses token lifetimes such as `900`, `15m`, `12h` or `10d`.
pub fn parse_expiry(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let amount: u64 = number
        .parse()
        .with_context(|| format!("invalid expiry {value:?}"))?;
    let seconds = match unit {
        "" | "s" => amount,
        "m" => amount * 60,
        "h" => amount * 60 * 60,
        "d" => amount * 24 * 60 * 60,
        other => bail!("unknown expiry unit {other:?} in {value:?}"),
    };
    if seconds == 0 {
        bail!("expiry must be positive");
    }
    Ok(Duration::from_secs(seconds))
}
