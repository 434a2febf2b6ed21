use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::rows::{collect_rows, owner_from};
use super::{Database, new_id, now_timestamp};
use crate::models::{PlaylistRecord, PlaylistVideo, PlaylistView};

const PLAYLIST_VIEW_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.created_at, p.updated_at,
           u.id AS owner_id, u.username AS owner_username,
           u.full_name AS owner_full_name, u.avatar AS owner_avatar
    FROM playlists p
    JOIN users u ON u.id = p.owner
"#;

impl Database {
    pub fn insert_playlist(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<PlaylistRecord> {
        let now = now_timestamp();
        let playlist = PlaylistRecord {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            owner: owner.to_string(),
            videos: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO playlists (id, name, description, owner, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    playlist.id,
                    playlist.name,
                    playlist.description,
                    playlist.owner,
                    playlist.created_at,
                    playlist.updated_at,
                ],
            )
            .context("inserting playlist")?;
            Ok(())
        })?;

        Ok(playlist)
    }

    /// The raw playlist with its video ids in insertion order.
    pub fn find_playlist(&self, id: &str) -> Result<Option<PlaylistRecord>> {
        self.with_connection(|conn| {
            let found = conn
                .query_row(
                    r#"
                    SELECT id, name, description, owner, created_at, updated_at
                    FROM playlists WHERE id = ?1
                    "#,
                    [id],
                    |row| {
                        Ok(PlaylistRecord {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            owner: row.get(3)?,
                            videos: Vec::new(),
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;

            let Some(mut playlist) = found else {
                return Ok(None);
            };
            let mut stmt = conn.prepare(
                "SELECT video FROM playlist_videos WHERE playlist = ?1 ORDER BY position",
            )?;
            playlist.videos = collect_rows(&mut stmt, [id], |row| Ok(row.get(0)?))?;
            Ok(Some(playlist))
        })
    }

    /// The playlist as `viewer` sees it: unpublished videos of other
    /// channels are left out.
    pub fn playlist_view(&self, id: &str, viewer: Option<&str>) -> Result<Option<PlaylistView>> {
        self.with_connection(|conn| {
            let conn: &Connection = conn;
            let mut stmt = conn.prepare(&format!("{PLAYLIST_VIEW_SELECT} WHERE p.id = ?1"))?;
            let mut found = collect_rows(&mut stmt, [id], |row| row_to_view(conn, row, viewer))?;
            Ok(found.pop())
        })
    }

    /// Playlists owned by `owner`, newest first.
    pub fn user_playlists(&self, owner: &str, viewer: Option<&str>) -> Result<Vec<PlaylistView>> {
        self.with_connection(|conn| {
            let conn: &Connection = conn;
            let mut stmt = conn.prepare(&format!(
                "{PLAYLIST_VIEW_SELECT} WHERE p.owner = ?1 ORDER BY p.created_at DESC, p.rowid DESC"
            ))?;
            collect_rows(&mut stmt, [owner], |row| row_to_view(conn, row, viewer))
        })
    }

    pub fn update_playlist(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<PlaylistRecord>> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE playlists
                SET name = COALESCE(?2, name),
                    description = COALESCE(?3, description),
                    updated_at = ?4
                WHERE id = ?1
                "#,
                params![id, name, description, now_timestamp()],
            )?;
            Ok(())
        })?;
        self.find_playlist(id)
    }

    pub fn delete_playlist(&self, id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM playlist_videos WHERE playlist = ?1", [id])?;
            let removed = tx.execute("DELETE FROM playlists WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    /// Appends `video_id`; returns false when it is already in the playlist.
    pub fn add_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let added = tx.execute(
                r#"
                INSERT OR IGNORE INTO playlist_videos (playlist, video, position)
                VALUES (
                    ?1, ?2,
                    (SELECT COALESCE(MAX(position), -1) + 1 FROM playlist_videos WHERE playlist = ?1)
                )
                "#,
                params![playlist_id, video_id],
            )?;
            if added > 0 {
                touch(&tx, playlist_id)?;
            }
            tx.commit()?;
            Ok(added > 0)
        })
    }

    /// Returns false when `video_id` was not in the playlist.
    pub fn remove_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM playlist_videos WHERE playlist = ?1 AND video = ?2",
                params![playlist_id, video_id],
            )?;
            if removed > 0 {
                touch(&tx, playlist_id)?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

fn touch(conn: &Connection, playlist_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE playlists SET updated_at = ?2 WHERE id = ?1",
        params![playlist_id, now_timestamp()],
    )?;
    Ok(())
}

fn row_to_view(
    conn: &Connection,
    row: &rusqlite::Row<'_>,
    viewer: Option<&str>,
) -> Result<PlaylistView> {
    let id: String = row.get("id")?;
    let videos = playlist_videos(conn, &id, viewer)?;
    Ok(PlaylistView {
        name: row.get("name")?,
        description: row.get("description")?,
        owner: owner_from(row, "owner")?,
        total_videos: videos.len(),
        videos,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        id,
    })
}

fn playlist_videos(
    conn: &Connection,
    playlist_id: &str,
    viewer: Option<&str>,
) -> Result<Vec<PlaylistVideo>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT v.id, v.title, v.thumbnail, v.duration, v.views, v.created_at,
               u.id AS owner_id, u.username AS owner_username,
               u.full_name AS owner_full_name, u.avatar AS owner_avatar
        FROM playlist_videos pv
        JOIN videos v ON v.id = pv.video
        JOIN users u ON u.id = v.owner
        WHERE pv.playlist = ?1
          AND (v.is_published = 1 OR v.owner = ?2)
        ORDER BY pv.position
        "#,
    )?;
    collect_rows(&mut stmt, params![playlist_id, viewer], |row| {
        Ok(PlaylistVideo {
            id: row.get("id")?,
            title: row.get("title")?,
            thumbnail: row.get("thumbnail")?,
            duration: row.get("duration")?,
            views: row.get("views")?,
            owner: owner_from(row, "owner")?,
            created_at: row.get("created_at")?,
        })
    })
}
