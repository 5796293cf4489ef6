//! Drives one upload through the stage order.
//!
//! Progress is written before and after every stage so a crashed or timed-out
//! run can be resumed from the persisted state. The orchestrator never retries
//! a failed stage itself; retry policy belongs to whoever invokes it.

use std::time::Instant;

use cadence_core::models::{Stage, StageRecord, Upload, UploadProgress, UploadStatus};
use cadence_core::validation::{validate_bucket_name, validate_identifier, validate_object_key};
use cadence_core::ValidationError;
use serde::Serialize;

use crate::context::PipelineContext;
use crate::deadline::with_deadline;
use crate::error::{log_stage_error, PipelineError, PipelineResult};
use crate::payloads::{
    CoverArt, MoveInput, RegisterInput, StatusInput, StatusOutput, TranscodeInput,
    TranscodeOutput,
};
use crate::stages::{Mover, TrackRegistrar, TranscodeInitiator};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub upload_id: String,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_key: Option<String>,
    /// Present when the transcode stage ran in this invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode: Option<TranscodeOutput>,
}

impl PipelineOutcome {
    fn from_upload(upload: &Upload, transcode: Option<TranscodeOutput>) -> Self {
        Self {
            upload_id: upload.id.clone(),
            status: upload.status,
            track_id: upload.track_id.clone(),
            album_id: upload.album_id.clone(),
            moved_key: upload.moved_key.clone(),
            transcode,
        }
    }
}

pub struct Orchestrator {
    ctx: PipelineContext,
    registrar: TrackRegistrar,
    mover: Mover,
    transcoder: TranscodeInitiator,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            registrar: TrackRegistrar::new(ctx.clone()),
            mover: Mover::new(ctx.clone()),
            transcoder: TranscodeInitiator::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Persist a new upload described by a registration event. A blank
    /// `uploadId` gets a freshly minted one.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn accept(&self, input: &RegisterInput) -> PipelineResult<Upload> {
        validate_identifier(&input.user_id, "userId")?;
        validate_object_key(&input.s3_key, "s3Key")?;
        validate_bucket_name(&input.bucket_name, "bucketName")?;
        if input.file_name.trim().is_empty() {
            return Err(ValidationError::Missing { field: "fileName" }.into());
        }
        let upload_id = if input.upload_id.is_empty() {
            self.ctx.ids.generate()
        } else {
            validate_identifier(&input.upload_id, "uploadId")?;
            input.upload_id.clone()
        };

        let upload = Upload::new(
            upload_id,
            input.user_id.clone(),
            input.s3_key.clone(),
            input.bucket_name.clone(),
            input.file_name.clone(),
            input.metadata.clone().unwrap_or_default(),
            input
                .cover_art
                .as_ref()
                .map(|c| c.cover_art_key.clone())
                .filter(|k| !k.is_empty()),
            self.ctx.clock.now(),
        );
        self.ctx.repo.create_upload(&upload).await?;

        tracing::info!(upload_id = %upload.id, source_key = %upload.source_key, "Upload accepted");
        Ok(upload)
    }

    /// Run every stage the upload has not completed yet.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, user_id: &str, upload_id: &str) -> PipelineResult<PipelineOutcome> {
        validate_identifier(user_id, "userId")?;
        validate_identifier(upload_id, "uploadId")?;

        let upload = self.ctx.repo.get_upload(user_id, upload_id).await?;
        if upload.status == UploadStatus::Complete {
            tracing::info!("Upload already complete");
            return Ok(PipelineOutcome::from_upload(&upload, None));
        }

        match Stage::ORDER.iter().copied().find(|s| !upload.has_completed(*s)) {
            Some(stage) => self.run_stages(upload, stage).await,
            None => self.finish(upload, None).await,
        }
    }

    /// Run `stage` and everything after it, using the inputs earlier stages
    /// persisted on the upload.
    #[tracing::instrument(skip(self))]
    pub async fn run_from(
        &self,
        user_id: &str,
        upload_id: &str,
        stage: Stage,
    ) -> PipelineResult<PipelineOutcome> {
        validate_identifier(user_id, "userId")?;
        validate_identifier(upload_id, "uploadId")?;

        let upload = self.ctx.repo.get_upload(user_id, upload_id).await?;
        let missing = upload.missing_prerequisites(stage);
        if !missing.is_empty() {
            return Err(ValidationError::invalid(
                "stage",
                format!("{} requires {:?} to have completed", stage, missing),
            )
            .into());
        }
        self.run_stages(upload, stage).await
    }

    async fn run_stages(
        &self,
        mut upload: Upload,
        first: Stage,
    ) -> PipelineResult<PipelineOutcome> {
        let start = Instant::now();
        let mut transcode = None;
        let mut next = Some(first);

        while let Some(stage) = next {
            let (record, output) = match self.attempt(stage, &upload).await {
                Ok(done) => done,
                Err(e) => return Err(self.fail(&upload, stage, e).await),
            };
            record.apply(&mut upload);
            if output.is_some() {
                transcode = output;
            }

            tracing::debug!(upload_id = %upload.id, stage = %stage, "Stage completed");
            next = stage.next();
        }

        let outcome = self.finish(upload, transcode).await?;
        tracing::info!(
            upload_id = %outcome.upload_id,
            track_id = ?outcome.track_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload pipeline complete"
        );
        Ok(outcome)
    }

    /// One stage plus the progress writes around it. An error from any of
    /// them fails the stage.
    async fn attempt(
        &self,
        stage: Stage,
        upload: &Upload,
    ) -> PipelineResult<(StageRecord, Option<TranscodeOutput>)> {
        self.write_progress(upload, &UploadProgress::running(stage))
            .await?;

        let (record, output) = with_deadline(
            stage,
            self.ctx.settings.stage_deadline,
            self.run_stage(stage, upload),
        )
        .await?;

        self.ctx
            .repo
            .record_stage_completion(&upload.user_id, &upload.id, &record, self.ctx.clock.now())
            .await?;
        Ok((record, output))
    }

    /// Mark the upload failed at `stage` and hand back the error that caused it.
    async fn fail(&self, upload: &Upload, stage: Stage, error: PipelineError) -> PipelineError {
        log_stage_error(&upload.id, stage, &error);
        let failed = UploadProgress::failed(Some(stage), error.to_string());
        if let Err(write_err) = self.write_progress(upload, &failed).await {
            tracing::error!(
                upload_id = %upload.id,
                error = %write_err,
                "Failed to record stage failure"
            );
        }
        error
    }

    async fn run_stage(
        &self,
        stage: Stage,
        upload: &Upload,
    ) -> PipelineResult<(StageRecord, Option<TranscodeOutput>)> {
        match stage {
            Stage::Register => {
                let input = RegisterInput {
                    upload_id: upload.id.clone(),
                    user_id: upload.user_id.clone(),
                    s3_key: upload.source_key.clone(),
                    file_name: upload.file_name.clone(),
                    metadata: Some(upload.metadata.clone()),
                    cover_art: upload.cover_art_key.clone().map(|cover_art_key| CoverArt {
                        cover_art_key,
                    }),
                    bucket_name: upload.bucket.clone(),
                    table_name: None,
                };
                let out = self.registrar.run(&input).await?;
                Ok((
                    StageRecord::Registered {
                        track_id: out.track_id,
                        album_id: out.album_id,
                    },
                    None,
                ))
            }
            Stage::Move => {
                let input = MoveInput {
                    upload_id: upload.id.clone(),
                    user_id: upload.user_id.clone(),
                    source_key: upload.source_key.clone(),
                    track_id: recorded_track(upload)?,
                    bucket_name: upload.bucket.clone(),
                };
                let out = self.mover.run(&input).await?;
                Ok((
                    StageRecord::Moved {
                        moved_key: out.new_key,
                    },
                    None,
                ))
            }
            Stage::Transcode => {
                let input = TranscodeInput {
                    track_id: recorded_track(upload)?,
                    user_id: upload.user_id.clone(),
                    s3_key: upload.current_key().to_string(),
                    table_name: None,
                };
                let out = self.transcoder.run(&input).await?;
                Ok((
                    StageRecord::Transcode {
                        job_id: out.job_id.clone(),
                    },
                    Some(out),
                ))
            }
        }
    }

    async fn finish(
        &self,
        mut upload: Upload,
        transcode: Option<TranscodeOutput>,
    ) -> PipelineResult<PipelineOutcome> {
        self.write_progress(&upload, &UploadProgress::complete())
            .await?;
        upload.status = UploadStatus::Complete;
        Ok(PipelineOutcome::from_upload(&upload, transcode))
    }

    async fn write_progress(&self, upload: &Upload, progress: &UploadProgress) -> PipelineResult<()> {
        self.ctx
            .repo
            .update_upload_progress(&upload.user_id, &upload.id, progress, self.ctx.clock.now())
            .await?;
        Ok(())
    }

    /// Record a terminal status reported by the orchestration engine.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id, upload_id = %input.upload_id))]
    pub async fn record_status(&self, input: &StatusInput) -> PipelineResult<StatusOutput> {
        validate_identifier(&input.user_id, "userId")?;
        validate_identifier(&input.upload_id, "uploadId")?;
        if let Some(track_id) = &input.track_id {
            validate_identifier(track_id, "trackId")?;
        }

        let progress = match input.status.to_ascii_uppercase().as_str() {
            "COMPLETED" => UploadProgress::complete(),
            "FAILED" => {
                let message = input
                    .error
                    .as_ref()
                    .map(|e| e.message())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                UploadProgress::failed(None, message)
            }
            "" => return Err(ValidationError::Missing { field: "status" }.into()),
            other => {
                return Err(ValidationError::invalid(
                    "status",
                    format!("expected COMPLETED or FAILED, got '{}'", other),
                )
                .into())
            }
        };

        self.ctx
            .repo
            .update_upload_progress(&input.user_id, &input.upload_id, &progress, self.ctx.clock.now())
            .await?;

        tracing::info!(status = %progress.status, "Upload status recorded");

        Ok(StatusOutput {
            success: true,
            message: format!("Upload {} status updated to {}", input.upload_id, progress.status),
        })
    }
}

fn recorded_track(upload: &Upload) -> Result<String, PipelineError> {
    upload
        .track_id
        .clone()
        .ok_or(PipelineError::Validation(ValidationError::Missing {
            field: "trackId",
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cadence_core::models::{HlsStatus, UploadMetadata};
    use cadence_core::ErrorMetadata;

    use crate::payloads::{EngineError, TranscodeStatus};
    use crate::test_helpers::{sample_upload, TestHarness};

    fn demo_upload() -> Upload {
        let mut upload = sample_upload("u1", "up-1", "uploads/u1/song.wav");
        upload.metadata = UploadMetadata {
            album: "Demo".into(),
            ..Default::default()
        };
        upload
    }

    #[tokio::test]
    async fn end_to_end_demo_upload() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");

        let outcome = Orchestrator::new(h.ctx()).process("u1", "up-1").await.unwrap();

        let track_id = outcome.track_id.clone().unwrap();
        let moved = format!("media/u1/{}.wav", track_id);
        assert_eq!(outcome.status, UploadStatus::Complete);
        assert_eq!(outcome.moved_key.as_deref(), Some(moved.as_str()));
        let transcode = outcome.transcode.unwrap();
        assert_eq!(transcode.status, TranscodeStatus::Started);
        assert!(transcode.job_id.is_some());
        assert_eq!(
            transcode.playlist_key,
            Some(format!("hls/u1/{}/master.m3u8", track_id))
        );

        let track = h.repo.track("u1", &track_id).unwrap();
        assert_eq!(track.album, "Demo");
        assert_eq!(track.s3_key, moved);
        assert_eq!(track.hls_status, HlsStatus::Processing);
        assert_eq!(track.album_id, outcome.album_id);

        let albums = h.repo.albums("u1");
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].name, "Demo");

        assert_eq!(h.encoder.submissions()[0].source_key, moved);

        let upload = h.repo.upload("u1", "up-1").unwrap();
        assert_eq!(upload.status, UploadStatus::Complete);
        assert!(upload.completed_at.is_some());
        assert_eq!(upload.completed_stages, Stage::ORDER.to_vec());
        assert_eq!(
            h.repo.progress_history("up-1"),
            vec![
                UploadStatus::Registering,
                UploadStatus::Moving,
                UploadStatus::Transcoding,
                UploadStatus::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn hard_failure_marks_upload_failed() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");
        h.storage.fail_copies(true);

        let err = Orchestrator::new(h.ctx()).process("u1", "up-1").await.unwrap_err();

        assert!(err.is_recoverable());
        let upload = h.repo.upload("u1", "up-1").unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        let last = upload.last_error.unwrap();
        assert_eq!(last.stage, Some(Stage::Move));
        assert_eq!(last.message, err.to_string());
        assert_eq!(upload.completed_stages, vec![Stage::Register]);
        assert!(h.encoder.submissions().is_empty());
    }

    #[tokio::test]
    async fn rerun_after_completion_does_not_duplicate() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");
        let orchestrator = Orchestrator::new(h.ctx());

        let first = orchestrator.process("u1", "up-1").await.unwrap();
        let second = orchestrator.process("u1", "up-1").await.unwrap();

        assert_eq!(first.track_id, second.track_id);
        assert_eq!(h.repo.calls("create_track"), 1);
        assert_eq!(h.storage.copy_count(), 1);
    }

    #[tokio::test]
    async fn bookkeeping_failure_marks_upload_failed() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");
        h.repo.fail_on("record_stage_completion");

        let err = Orchestrator::new(h.ctx()).process("u1", "up-1").await.unwrap_err();

        assert!(matches!(err, PipelineError::Repository(_)));
        let upload = h.repo.upload("u1", "up-1").unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        assert_eq!(upload.current_stage, Some(Stage::Register));
        let last = upload.last_error.unwrap();
        assert_eq!(last.stage, Some(Stage::Register));
        assert_eq!(last.message, err.to_string());
        assert!(upload.completed_stages.is_empty());
    }

    #[tokio::test]
    async fn rerun_after_lost_completion_record_reuses_track() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");
        let orchestrator = Orchestrator::new(h.ctx());

        h.repo.fail_on("record_stage_completion");
        orchestrator.process("u1", "up-1").await.unwrap_err();
        let reserved = h.repo.upload("u1", "up-1").unwrap().track_id;
        assert!(reserved.is_some());

        h.repo.recover("record_stage_completion");
        let outcome = orchestrator.process("u1", "up-1").await.unwrap();

        assert_eq!(outcome.status, UploadStatus::Complete);
        assert_eq!(outcome.track_id, reserved);
        assert_eq!(h.repo.calls("create_track"), 1);
        assert_eq!(h.repo.albums("u1")[0].track_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_fails_the_stage() {
        let h = TestHarness::new().with_deadline(Duration::from_millis(100));
        h.repo.insert_upload(demo_upload());
        h.storage.put("uploads/u1/song.wav", b"RIFF");
        h.storage.delay_copies(Duration::from_secs(10));

        let err = Orchestrator::new(h.ctx()).process("u1", "up-1").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::DeadlineExceeded {
                stage: Stage::Move,
                ..
            }
        ));
        let upload = h.repo.upload("u1", "up-1").unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        assert_eq!(upload.last_error.unwrap().stage, Some(Stage::Move));
    }

    #[tokio::test]
    async fn accept_persists_pending_upload() {
        let h = TestHarness::new();
        let input = RegisterInput {
            user_id: "u1".into(),
            s3_key: "uploads/u1/song.wav".into(),
            file_name: "song.wav".into(),
            bucket_name: "cadence-media".into(),
            ..Default::default()
        };

        let upload = Orchestrator::new(h.ctx()).accept(&input).await.unwrap();

        assert_eq!(upload.id, "id-1");
        assert_eq!(upload.status, UploadStatus::Pending);
        assert!(h.repo.upload("u1", "id-1").is_some());
    }

    #[tokio::test]
    async fn records_engine_failure() {
        let h = TestHarness::new();
        h.repo.insert_upload(demo_upload());
        let input = StatusInput {
            upload_id: "up-1".into(),
            user_id: "u1".into(),
            status: "FAILED".into(),
            error: Some(EngineError {
                error: "States.Timeout".into(),
                cause: "Move timed out".into(),
            }),
            ..Default::default()
        };

        let out = Orchestrator::new(h.ctx()).record_status(&input).await.unwrap();

        assert!(out.success);
        assert_eq!(out.message, "Upload up-1 status updated to failed");
        let upload = h.repo.upload("u1", "up-1").unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        let last = upload.last_error.unwrap();
        assert_eq!(last.stage, None);
        assert_eq!(last.message, "States.Timeout: Move timed out");
    }

    #[tokio::test]
    async fn rejects_unknown_engine_status() {
        let h = TestHarness::new();
        let input = StatusInput {
            upload_id: "up-1".into(),
            user_id: "u1".into(),
            status: "RUNNING".into(),
            ..Default::default()
        };

        let err = Orchestrator::new(h.ctx()).record_status(&input).await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(h.repo.total_calls(), 0);
    }
}
