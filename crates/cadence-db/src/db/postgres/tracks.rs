use cadence_core::models::{HlsStatus, HlsUpdate, Track};
use chrono::{DateTime, Utc};
use sqlx::Postgres;

use super::{map_insert_error, PgLibraryRepository};
use crate::error::{RepositoryError, RepositoryResult};

const TRACK_COLUMNS: &str = "id, user_id, title, artist, album, album_id, genre, year, duration, \
     format, bitrate, s3_key, cover_art_key, hls_status, hls_job_id, hls_playlist_key, \
     play_count, version, created_at, updated_at";

/// Row type for the tracks table
#[derive(Debug, sqlx::FromRow)]
struct TrackRow {
    id: String,
    user_id: String,
    title: String,
    artist: String,
    album: String,
    album_id: Option<String>,
    genre: String,
    year: i32,
    duration: i32,
    format: String,
    bitrate: i32,
    s3_key: String,
    cover_art_key: Option<String>,
    hls_status: String,
    hls_job_id: Option<String>,
    hls_playlist_key: Option<String>,
    play_count: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TrackRow {
    fn into_track(self) -> RepositoryResult<Track> {
        Ok(Track {
            hls_status: self.hls_status.parse::<HlsStatus>()?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            album_id: self.album_id,
            genre: self.genre,
            year: self.year,
            duration: self.duration,
            format: self.format,
            bitrate: self.bitrate,
            s3_key: self.s3_key,
            cover_art_key: self.cover_art_key,
            hls_job_id: self.hls_job_id,
            hls_playlist_key: self.hls_playlist_key,
            play_count: self.play_count,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgLibraryRepository {
    #[tracing::instrument(skip(self), fields(db.table = "tracks", db.operation = "select"))]
    pub(super) async fn fetch_track(&self, user_id: &str, track_id: &str) -> RepositoryResult<Track> {
        let row = sqlx::query_as::<Postgres, TrackRow>(&format!(
            "SELECT {} FROM tracks WHERE user_id = $1 AND id = $2",
            TRACK_COLUMNS
        ))
        .bind(user_id)
        .bind(track_id)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| RepositoryError::not_found("track", track_id))?
            .into_track()
    }

    async fn track_exists(&self, user_id: &str, track_id: &str) -> RepositoryResult<bool> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM tracks WHERE user_id = $1 AND id = $2)",
        )
        .bind(user_id)
        .bind(track_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self, track), fields(db.table = "tracks", db.operation = "insert", db.record_id = %track.id))]
    pub(super) async fn insert_track(&self, track: &Track) -> RepositoryResult<()> {
        sqlx::query(&format!(
            "INSERT INTO tracks ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20)",
            TRACK_COLUMNS
        ))
        .bind(&track.id)
        .bind(&track.user_id)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.album)
        .bind(&track.album_id)
        .bind(&track.genre)
        .bind(track.year)
        .bind(track.duration)
        .bind(&track.format)
        .bind(track.bitrate)
        .bind(&track.s3_key)
        .bind(&track.cover_art_key)
        .bind(track.hls_status.as_str())
        .bind(&track.hls_job_id)
        .bind(&track.hls_playlist_key)
        .bind(track.play_count)
        .bind(track.version)
        .bind(track.created_at)
        .bind(track.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_insert_error(e, "track", &track.id))?;

        Ok(())
    }

    #[tracing::instrument(skip(self, track), fields(db.table = "tracks", db.operation = "update", db.record_id = %track.id))]
    pub(super) async fn replace_track(
        &self,
        track: &Track,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Track> {
        let row = sqlx::query_as::<Postgres, TrackRow>(&format!(
            r#"
            UPDATE tracks
            SET title = $4, artist = $5, album = $6, album_id = $7, genre = $8, year = $9,
                duration = $10, format = $11, bitrate = $12, s3_key = $13, cover_art_key = $14,
                hls_status = $15, hls_job_id = $16, hls_playlist_key = $17, play_count = $18,
                version = version + 1, updated_at = $19
            WHERE user_id = $1 AND id = $2 AND version = $3
            RETURNING {}
            "#,
            TRACK_COLUMNS
        ))
        .bind(&track.user_id)
        .bind(&track.id)
        .bind(track.version)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.album)
        .bind(&track.album_id)
        .bind(&track.genre)
        .bind(track.year)
        .bind(track.duration)
        .bind(&track.format)
        .bind(track.bitrate)
        .bind(&track.s3_key)
        .bind(&track.cover_art_key)
        .bind(track.hls_status.as_str())
        .bind(&track.hls_job_id)
        .bind(&track.hls_playlist_key)
        .bind(track.play_count)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_track(),
            None if self.track_exists(&track.user_id, &track.id).await? => {
                Err(RepositoryError::VersionConflict {
                    entity: "track",
                    id: track.id.clone(),
                    expected: track.version,
                })
            }
            None => Err(RepositoryError::not_found("track", &track.id)),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "tracks", db.operation = "update"))]
    pub(super) async fn update_track_location(
        &self,
        user_id: &str,
        track_id: &str,
        s3_key: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tracks
            SET s3_key = $3, version = version + 1, updated_at = $4
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(track_id)
        .bind(s3_key)
        .bind(now)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("track", track_id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "tracks", db.operation = "update"))]
    pub(super) async fn update_track_hls(
        &self,
        user_id: &str,
        track_id: &str,
        update: &HlsUpdate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let allowed: Vec<&str> = update
            .status
            .predecessors()
            .iter()
            .map(|s| s.as_str())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE tracks
            SET hls_status = $3, hls_job_id = $4, hls_playlist_key = $5,
                version = version + 1, updated_at = $6
            WHERE user_id = $1 AND id = $2 AND hls_status = ANY($7)
              AND (hls_status <> 'processing' OR hls_job_id IS NOT DISTINCT FROM $4)
            "#,
        )
        .bind(user_id)
        .bind(track_id)
        .bind(update.status.as_str())
        .bind(&update.job_id)
        .bind(&update.playlist_key)
        .bind(now)
        .bind(allowed)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost transition from a missing track
        self.fetch_track(user_id, track_id).await?;
        Ok(false)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tracks", db.operation = "update"))]
    pub(super) async fn link_album(
        &self,
        user_id: &str,
        track_id: &str,
        album_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut tx = self.pool().begin().await?;

        let linked = sqlx::query(
            r#"
            UPDATE tracks
            SET album_id = $3, version = version + 1, updated_at = $4
            WHERE user_id = $1 AND id = $2 AND album_id IS NULL
            "#,
        )
        .bind(user_id)
        .bind(track_id)
        .bind(album_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() == 0 {
            tx.rollback().await?;
            if self.track_exists(user_id, track_id).await? {
                return Ok(false);
            }
            return Err(RepositoryError::not_found("track", track_id));
        }

        let counted = sqlx::query(
            "UPDATE albums SET track_count = track_count + 1 WHERE user_id = $1 AND id = $2",
        )
        .bind(user_id)
        .bind(album_id)
        .execute(&mut *tx)
        .await?;

        if counted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::not_found("album", album_id));
        }

        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tracks", db.operation = "select"))]
    pub(super) async fn tracks_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Track>> {
        let rows = sqlx::query_as::<Postgres, TrackRow>(&format!(
            "SELECT {} FROM tracks WHERE user_id = $1 AND artist = $2 ORDER BY created_at, id",
            TRACK_COLUMNS
        ))
        .bind(user_id)
        .bind(artist)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(TrackRow::into_track).collect()
    }
}
