//! PostgreSQL implementation of [`LibraryRepository`].
//!
//! Queries are split by table; this module wires them into the trait.

mod albums;
mod tracks;
mod uploads;

use async_trait::async_trait;
use cadence_core::models::{
    Album, HlsUpdate, Stage, StageRecord, Track, Upload, UploadProgress,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::repository::LibraryRepository;
use crate::error::{RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PgLibraryRepository {
    pool: PgPool,
}

impl PgLibraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique-key violation on insert to `AlreadyExists`.
fn map_insert_error(err: sqlx::Error, entity: &'static str, id: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::AlreadyExists {
                entity,
                id: id.to_string(),
            }
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl LibraryRepository for PgLibraryRepository {
    async fn get_track(&self, user_id: &str, track_id: &str) -> RepositoryResult<Track> {
        self.fetch_track(user_id, track_id).await
    }

    async fn create_track(&self, track: &Track) -> RepositoryResult<()> {
        self.insert_track(track).await
    }

    async fn update_track(&self, track: &Track, now: DateTime<Utc>) -> RepositoryResult<Track> {
        self.replace_track(track, now).await
    }

    async fn set_track_location(
        &self,
        user_id: &str,
        track_id: &str,
        s3_key: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.update_track_location(user_id, track_id, s3_key, now)
            .await
    }

    async fn set_track_hls(
        &self,
        user_id: &str,
        track_id: &str,
        update: &HlsUpdate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.update_track_hls(user_id, track_id, update, now).await
    }

    async fn link_track_album(
        &self,
        user_id: &str,
        track_id: &str,
        album_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.link_album(user_id, track_id, album_id, now).await
    }

    async fn get_or_create_album(&self, candidate: &Album) -> RepositoryResult<Album> {
        self.upsert_album(candidate).await
    }

    async fn list_tracks_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Track>> {
        self.tracks_by_artist(user_id, artist).await
    }

    async fn list_albums_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Album>> {
        self.albums_by_artist(user_id, artist).await
    }

    async fn create_upload(&self, upload: &Upload) -> RepositoryResult<()> {
        self.insert_upload(upload).await
    }

    async fn get_upload(&self, user_id: &str, upload_id: &str) -> RepositoryResult<Upload> {
        self.fetch_upload(user_id, upload_id).await
    }

    async fn reserve_upload_track(
        &self,
        user_id: &str,
        upload_id: &str,
        track_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        self.claim_track_id(user_id, upload_id, track_id, now).await
    }

    async fn update_upload_progress(
        &self,
        user_id: &str,
        upload_id: &str,
        progress: &UploadProgress,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.write_progress(user_id, upload_id, progress, now).await
    }

    async fn record_stage_completion(
        &self,
        user_id: &str,
        upload_id: &str,
        record: &StageRecord,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.write_stage_record(user_id, upload_id, record, now)
            .await
    }

    async fn begin_reprocess(
        &self,
        user_id: &str,
        upload_id: &str,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.reset_failed_upload(user_id, upload_id, stage, now)
            .await
    }
}
