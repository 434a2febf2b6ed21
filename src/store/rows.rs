//! Shared SELECT fragments and row converters.

use anyhow::Result;
use rusqlite::{Connection, Params, Row, Statement};

use crate::models::{OwnerSummary, UserRecord, VideoView};

pub(super) const USER_COLUMNS: &str =
    "id, username, email, full_name, avatar, cover_image, created_at, updated_at";

/// Video columns plus the owner's summary under `owner_*` aliases. Pair
/// with [`VIDEO_VIEW_FROM`].
pub(super) const VIDEO_VIEW_COLUMNS: &str = r#"
    v.id, v.video_file, v.thumbnail, v.title, v.description, v.duration,
    v.views, v.is_published, v.created_at, v.updated_at,
    u.id AS owner_id, u.username AS owner_username,
    u.full_name AS owner_full_name, u.avatar AS owner_avatar
"#;

pub(super) const VIDEO_VIEW_FROM: &str = "FROM videos v JOIN users u ON u.id = v.owner";

/// Runs a prepared statement and converts every row with `map`.
pub(super) fn collect_rows<T, P, F>(stmt: &mut Statement<'_>, params: P, map: F) -> Result<Vec<T>>
where
    P: Params,
    F: Fn(&Row<'_>) -> Result<T>,
{
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(map(row)?);
    }
    Ok(records)
}

pub(super) fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<i64> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

pub(super) fn row_to_user(row: &Row<'_>) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        full_name: row.get("full_name")?,
        avatar: row.get("avatar")?,
        cover_image: row.get("cover_image")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Reads an owner summary stored under `<prefix>_id`, `<prefix>_username`, …
pub(super) fn owner_from(row: &Row<'_>, prefix: &str) -> Result<OwnerSummary> {
    Ok(OwnerSummary {
        id: row.get(format!("{prefix}_id").as_str())?,
        username: row.get(format!("{prefix}_username").as_str())?,
        full_name: row.get(format!("{prefix}_full_name").as_str())?,
        avatar: row.get(format!("{prefix}_avatar").as_str())?,
    })
}

pub(super) fn row_to_video_view(row: &Row<'_>) -> Result<VideoView> {
    Ok(VideoView {
        id: row.get("id")?,
        video_file: row.get("video_file")?,
        thumbnail: row.get("thumbnail")?,
        title: row.get("title")?,
        description: row.get("description")?,
        duration: row.get("duration")?,
        views: row.get("views")?,
        is_published: row.get::<_, i64>("is_published").map(|value| value != 0)?,
        owner: owner_from(row, "owner")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_preview_mode: None,
    })
}

/// Escapes `%`, `_` and `\` so user text matches literally inside
/// `LIKE … ESCAPE '\'`.
pub(super) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
