//! Re-enters the pipeline for a failed upload at a named stage.

use cadence_core::models::{Stage, UploadStatus};
use cadence_core::validation::validate_identifier;
use cadence_core::ValidationError;

use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::{Orchestrator, PipelineOutcome};

pub struct ReprocessCoordinator {
    orchestrator: Orchestrator,
}

impl ReprocessCoordinator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Reset a failed upload to `stage_name` and run the pipeline from there.
    ///
    /// Rejected when the stage name is unknown, the upload is not `failed`,
    /// or an earlier stage never completed.
    #[tracing::instrument(skip(self))]
    pub async fn reprocess(
        &self,
        user_id: &str,
        upload_id: &str,
        stage_name: &str,
    ) -> PipelineResult<PipelineOutcome> {
        let stage: Stage = stage_name.parse()?;
        validate_identifier(user_id, "userId")?;
        validate_identifier(upload_id, "uploadId")?;

        let ctx = self.orchestrator.context();
        let upload = ctx.repo.get_upload(user_id, upload_id).await?;

        if upload.status != UploadStatus::Failed {
            return Err(PipelineError::conflict(format!(
                "upload {} is {}, only failed uploads can be reprocessed",
                upload_id, upload.status
            )));
        }

        let missing = upload.missing_prerequisites(stage);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            return Err(ValidationError::invalid(
                "stage",
                format!("cannot resume at {}: {} not completed", stage, names.join(", ")),
            )
            .into());
        }

        if !ctx
            .repo
            .begin_reprocess(user_id, upload_id, stage, ctx.clock.now())
            .await?
        {
            return Err(PipelineError::conflict(format!(
                "upload {} is already being reprocessed",
                upload_id
            )));
        }

        tracing::info!(stage = %stage, "Reprocessing upload");
        self.orchestrator.run_from(user_id, upload_id, stage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_helpers::{sample_upload, TestHarness};

    async fn failed_at_move(h: &TestHarness) {
        h.repo.insert_upload(sample_upload("u1", "up-1", "uploads/u1/song.mp3"));
        h.storage.put("uploads/u1/song.mp3", b"ID3");
        h.storage.fail_copies(true);
        let _ = Orchestrator::new(h.ctx()).process("u1", "up-1").await;
        h.storage.fail_copies(false);
    }

    #[tokio::test]
    async fn rejects_unknown_stage() {
        let h = TestHarness::new();
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let err = coordinator.reprocess("u1", "up-1", "publish").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.repo.total_calls(), 0);
    }

    #[tokio::test]
    async fn rejects_upload_that_is_not_failed() {
        let h = TestHarness::new();
        h.repo.insert_upload(sample_upload("u1", "up-1", "uploads/u1/song.mp3"));
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let err = coordinator.reprocess("u1", "up-1", "move").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn rejects_unmet_prerequisites() {
        let h = TestHarness::new();
        failed_at_move(&h).await;
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let err = coordinator.reprocess("u1", "up-1", "transcode").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            h.repo.upload("u1", "up-1").unwrap().status,
            UploadStatus::Failed
        );
    }

    #[tokio::test]
    async fn resumes_without_second_track() {
        let h = TestHarness::new();
        failed_at_move(&h).await;
        let track_id = h.repo.upload("u1", "up-1").unwrap().track_id.unwrap();
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let outcome = coordinator.reprocess("u1", "up-1", "moving").await.unwrap();

        assert_eq!(outcome.status, UploadStatus::Complete);
        assert_eq!(outcome.track_id.as_deref(), Some(track_id.as_str()));
        assert_eq!(h.repo.calls("create_track"), 1);
        assert_eq!(
            h.repo.track("u1", &track_id).unwrap().s3_key,
            format!("media/u1/{}.mp3", track_id)
        );
    }

    #[tokio::test]
    async fn reprocess_from_register_reuses_track() {
        let h = TestHarness::new();
        failed_at_move(&h).await;
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let outcome = coordinator.reprocess("u1", "up-1", "register").await.unwrap();

        assert_eq!(outcome.status, UploadStatus::Complete);
        assert_eq!(h.repo.calls("create_track"), 1);
    }

    #[tokio::test]
    async fn concurrent_reprocess_loses() {
        let h = TestHarness::new();
        failed_at_move(&h).await;
        h.repo.force_reprocess_conflict();
        let coordinator = ReprocessCoordinator::new(Orchestrator::new(h.ctx()));

        let err = coordinator.reprocess("u1", "up-1", "move").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
