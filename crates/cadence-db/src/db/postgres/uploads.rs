use cadence_core::models::{
    Stage, StageError, StageRecord, Upload, UploadMetadata, UploadProgress, UploadStatus,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::Postgres;

use super::{map_insert_error, PgLibraryRepository};
use crate::error::{RepositoryError, RepositoryResult};

const UPLOAD_COLUMNS: &str = "id, user_id, source_key, bucket, file_name, metadata, \
     cover_art_key, status, current_stage, last_error, track_id, album_id, moved_key, \
     hls_job_id, completed_stages, created_at, updated_at, completed_at";

/// Adds `$3` to completed_stages once.
const APPEND_STAGE: &str = "completed_stages = CASE WHEN $3 = ANY(completed_stages) \
     THEN completed_stages ELSE array_append(completed_stages, $3) END";

/// Row type for the uploads table
#[derive(Debug, sqlx::FromRow)]
struct UploadRow {
    id: String,
    user_id: String,
    source_key: String,
    bucket: String,
    file_name: String,
    metadata: Json<UploadMetadata>,
    cover_art_key: Option<String>,
    status: String,
    current_stage: Option<String>,
    last_error: Option<Json<StageError>>,
    track_id: Option<String>,
    album_id: Option<String>,
    moved_key: Option<String>,
    hls_job_id: Option<String>,
    completed_stages: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl UploadRow {
    fn into_upload(self) -> RepositoryResult<Upload> {
        let mut completed_stages = self
            .completed_stages
            .iter()
            .map(|s| s.parse::<Stage>())
            .collect::<Result<Vec<_>, _>>()?;
        completed_stages.sort();
        completed_stages.dedup();

        Ok(Upload {
            id: self.id,
            user_id: self.user_id,
            source_key: self.source_key,
            bucket: self.bucket,
            file_name: self.file_name,
            metadata: self.metadata.0,
            cover_art_key: self.cover_art_key,
            status: self.status.parse::<UploadStatus>()?,
            current_stage: self
                .current_stage
                .as_deref()
                .map(str::parse::<Stage>)
                .transpose()?,
            last_error: self.last_error.map(|e| e.0),
            track_id: self.track_id,
            album_id: self.album_id,
            moved_key: self.moved_key,
            hls_job_id: self.hls_job_id,
            completed_stages,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

impl PgLibraryRepository {
    #[tracing::instrument(skip(self, upload), fields(db.table = "uploads", db.operation = "insert", db.record_id = %upload.id))]
    pub(super) async fn insert_upload(&self, upload: &Upload) -> RepositoryResult<()> {
        let completed: Vec<String> = upload
            .completed_stages
            .iter()
            .map(|s| s.to_string())
            .collect();

        sqlx::query(&format!(
            "INSERT INTO uploads ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
             $12, $13, $14, $15, $16, $17, $18)",
            UPLOAD_COLUMNS
        ))
        .bind(&upload.id)
        .bind(&upload.user_id)
        .bind(&upload.source_key)
        .bind(&upload.bucket)
        .bind(&upload.file_name)
        .bind(Json(&upload.metadata))
        .bind(&upload.cover_art_key)
        .bind(upload.status.as_str())
        .bind(upload.current_stage.map(Stage::as_str))
        .bind(upload.last_error.as_ref().map(Json))
        .bind(&upload.track_id)
        .bind(&upload.album_id)
        .bind(&upload.moved_key)
        .bind(&upload.hls_job_id)
        .bind(&completed)
        .bind(upload.created_at)
        .bind(upload.updated_at)
        .bind(upload.completed_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_insert_error(e, "upload", &upload.id))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub(super) async fn fetch_upload(
        &self,
        user_id: &str,
        upload_id: &str,
    ) -> RepositoryResult<Upload> {
        let row = sqlx::query_as::<Postgres, UploadRow>(&format!(
            "SELECT {} FROM uploads WHERE user_id = $1 AND id = $2",
            UPLOAD_COLUMNS
        ))
        .bind(user_id)
        .bind(upload_id)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| RepositoryError::not_found("upload", upload_id))?
            .into_upload()
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "update"))]
    pub(super) async fn claim_track_id(
        &self,
        user_id: &str,
        upload_id: &str,
        track_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        let stored: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE uploads
            SET track_id = COALESCE(track_id, $3), updated_at = $4
            WHERE user_id = $1 AND id = $2
            RETURNING track_id
            "#,
        )
        .bind(user_id)
        .bind(upload_id)
        .bind(track_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        match stored {
            Some((Some(id),)) => Ok(id),
            Some((None,)) => Ok(track_id.to_string()),
            None => Err(RepositoryError::not_found("upload", upload_id)),
        }
    }

    #[tracing::instrument(skip(self, progress), fields(db.table = "uploads", db.operation = "update", status = %progress.status))]
    pub(super) async fn write_progress(
        &self,
        user_id: &str,
        upload_id: &str,
        progress: &UploadProgress,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let completed_at = (progress.status == UploadStatus::Complete).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET status = $3, current_stage = $4, last_error = $5, updated_at = $6,
                completed_at = COALESCE($7, completed_at)
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(upload_id)
        .bind(progress.status.as_str())
        .bind(progress.current_stage.map(Stage::as_str))
        .bind(progress.last_error.as_ref().map(Json))
        .bind(now)
        .bind(completed_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("upload", upload_id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "uploads", db.operation = "update", stage = %record.stage()))]
    pub(super) async fn write_stage_record(
        &self,
        user_id: &str,
        upload_id: &str,
        record: &StageRecord,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let stage = record.stage().as_str();

        let (sql, values): (String, Vec<Option<String>>) = match record {
            StageRecord::Registered { track_id, album_id } => (
                format!(
                    "UPDATE uploads SET track_id = $5, album_id = $6, {}, updated_at = $4 \
                     WHERE user_id = $1 AND id = $2",
                    APPEND_STAGE
                ),
                vec![Some(track_id.clone()), album_id.clone()],
            ),
            StageRecord::Moved { moved_key } => (
                format!(
                    "UPDATE uploads SET moved_key = $5, {}, updated_at = $4 \
                     WHERE user_id = $1 AND id = $2",
                    APPEND_STAGE
                ),
                vec![Some(moved_key.clone())],
            ),
            StageRecord::Transcode { job_id } => (
                format!(
                    "UPDATE uploads SET hls_job_id = COALESCE($5, hls_job_id), {}, \
                     updated_at = $4 WHERE user_id = $1 AND id = $2",
                    APPEND_STAGE
                ),
                vec![job_id.clone()],
            ),
        };

        let mut query = sqlx::query(&sql)
            .bind(user_id)
            .bind(upload_id)
            .bind(stage)
            .bind(now);
        for value in values {
            query = query.bind(value);
        }

        let result = query.execute(self.pool()).await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("upload", upload_id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "update"))]
    pub(super) async fn reset_failed_upload(
        &self,
        user_id: &str,
        upload_id: &str,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'pending', current_stage = $3, last_error = NULL, updated_at = $4
            WHERE user_id = $1 AND id = $2 AND status = 'failed'
            "#,
        )
        .bind(user_id)
        .bind(upload_id)
        .bind(stage.as_str())
        .bind(now)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish "not failed" from "no such upload"
        self.fetch_upload(user_id, upload_id).await?;
        Ok(false)
    }
}
