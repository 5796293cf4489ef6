//! Submits the adaptive-bitrate encode for a track.
//!
//! Nothing this stage does can fail the pipeline once its input is valid and
//! the track exists: a missing encoder or a rejected submission is reported
//! in the output status instead.

use std::time::Instant;

use cadence_core::models::{HlsStatus, HlsUpdate, Stage};
use cadence_core::validation::{validate_identifier, validate_object_key};
use cadence_core::ValidationError;
use cadence_storage::hls_output_prefix;

use crate::context::PipelineContext;
use crate::error::{soft_failure, PipelineResult};
use crate::payloads::{TranscodeInput, TranscodeOutput};
use crate::transcode::EncodeRequest;

pub const REASON_DISABLED: &str = "transcode_disabled";
pub const REASON_ALREADY_FINISHED: &str = "transcode_already_finished";

pub struct TranscodeInitiator {
    ctx: PipelineContext,
}

impl TranscodeInitiator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    fn validate(input: &TranscodeInput) -> Result<(), ValidationError> {
        validate_identifier(&input.user_id, "userId")?;
        validate_identifier(&input.track_id, "trackId")?;
        validate_object_key(&input.s3_key, "s3Key")
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id, track_id = %input.track_id))]
    pub async fn run(&self, input: &TranscodeInput) -> PipelineResult<TranscodeOutput> {
        Self::validate(input)?;

        let Some(encoder) = self.ctx.encoder.as_ref() else {
            tracing::info!("No encoder configured, skipping transcode");
            return Ok(TranscodeOutput::skipped(REASON_DISABLED));
        };

        let track = self
            .ctx
            .repo
            .get_track(&input.user_id, &input.track_id)
            .await?;

        if track.hls_status == HlsStatus::Processing {
            if let Some(job_id) = track.hls_job_id {
                tracing::info!(job_id = %job_id, "Encode already submitted");
                return Ok(TranscodeOutput::started(job_id, track.hls_playlist_key));
            }
        }
        if !track.hls_status.can_transition_to(HlsStatus::Processing) {
            tracing::info!(hls_status = %track.hls_status, "Track already transcoded");
            return Ok(TranscodeOutput::skipped(REASON_ALREADY_FINISHED));
        }

        let start = Instant::now();
        let request = EncodeRequest {
            user_id: input.user_id.clone(),
            track_id: input.track_id.clone(),
            source_key: input.s3_key.clone(),
            output_prefix: hls_output_prefix(
                &self.ctx.settings.hls_output_prefix,
                &input.user_id,
                &input.track_id,
            ),
        };

        let job = match encoder.submit(&request).await {
            Ok(job) => job,
            Err(e) => {
                soft_failure(Stage::Transcode, "submit", &e);
                return Ok(TranscodeOutput::failed(format!("transcode_failed: {}", e)));
            }
        };

        // The job exists whether or not this write lands
        let update = HlsUpdate {
            status: HlsStatus::Processing,
            job_id: Some(job.job_id.clone()),
            playlist_key: Some(job.manifest_key.clone()),
        };
        match self
            .ctx
            .repo
            .set_track_hls(&input.user_id, &input.track_id, &update, self.ctx.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.lost_race(input, &job.job_id).await,
            Err(e) => soft_failure(Stage::Transcode, "record_job", &e),
        }

        tracing::info!(
            job_id = %job.job_id,
            playlist_key = %job.manifest_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcode started"
        );

        Ok(TranscodeOutput::started(job.job_id, Some(job.manifest_key)))
    }

    /// Another invocation moved the track's HLS state between our read and
    /// our write. Report what it recorded; the job we submitted is abandoned.
    async fn lost_race(
        &self,
        input: &TranscodeInput,
        orphan: &str,
    ) -> PipelineResult<TranscodeOutput> {
        let track = self
            .ctx
            .repo
            .get_track(&input.user_id, &input.track_id)
            .await?;
        tracing::warn!(
            orphan_job_id = %orphan,
            hls_status = %track.hls_status,
            job_id = ?track.hls_job_id,
            "Transcode already recorded by a concurrent run"
        );
        match (track.hls_status, track.hls_job_id) {
            (HlsStatus::Processing, Some(job_id)) => {
                Ok(TranscodeOutput::started(job_id, track.hls_playlist_key))
            }
            _ => Ok(TranscodeOutput::skipped(REASON_ALREADY_FINISHED)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::payloads::TranscodeStatus;
    use crate::test_helpers::{sample_track, TestHarness};
    use cadence_storage::hls_manifest_key;

    fn input() -> TranscodeInput {
        TranscodeInput {
            track_id: "t1".into(),
            user_id: "u1".into(),
            s3_key: "media/u1/t1.mp3".into(),
            table_name: None,
        }
    }

    #[tokio::test]
    async fn skipped_without_encoder() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));

        let out = TranscodeInitiator::new(h.ctx_without_encoder())
            .run(&input())
            .await
            .unwrap();

        assert_eq!(out.status, TranscodeStatus::Skipped);
        assert_eq!(out.reason.as_deref(), Some(REASON_DISABLED));
        assert_eq!(h.repo.track("u1", "t1").unwrap().hls_status, HlsStatus::None);
    }

    #[tokio::test]
    async fn submits_and_records_processing() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Started);
        assert_eq!(out.job_id.as_deref(), Some("job-1"));
        assert_eq!(
            out.playlist_key,
            Some(hls_manifest_key("hls", "u1", "t1"))
        );
        let submitted = h.encoder.submissions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].source_key, "media/u1/t1.mp3");
        assert_eq!(submitted[0].output_prefix, "hls/u1/t1/");

        let track = h.repo.track("u1", "t1").unwrap();
        assert_eq!(track.hls_status, HlsStatus::Processing);
        assert_eq!(track.hls_job_id.as_deref(), Some("job-1"));
        assert_eq!(track.s3_key, "media/u1/t1.mp3");
    }

    #[tokio::test]
    async fn does_not_resubmit_in_flight_job() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        let stage = TranscodeInitiator::new(h.ctx());

        stage.run(&input()).await.unwrap();
        let again = stage.run(&input()).await.unwrap();

        assert_eq!(again.status, TranscodeStatus::Started);
        assert_eq!(again.job_id.as_deref(), Some("job-1"));
        assert_eq!(h.encoder.submissions().len(), 1);
    }

    #[tokio::test]
    async fn ready_track_is_left_alone() {
        let h = TestHarness::new();
        let mut track = sample_track("u1", "t1", "media/u1/t1.mp3");
        track.hls_status = HlsStatus::Ready;
        h.repo.insert_track(track);

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Skipped);
        assert!(h.encoder.submissions().is_empty());
    }

    #[tokio::test]
    async fn submission_failure_is_soft() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        h.encoder.fail_submissions(true);

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Failed);
        assert!(out.reason.unwrap().starts_with("transcode_failed: "));
        assert_eq!(h.repo.track("u1", "t1").unwrap().hls_status, HlsStatus::None);
    }

    #[tokio::test]
    async fn record_failure_after_submit_still_started() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        h.repo.fail_on("set_track_hls");

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Started);
    }

    #[tokio::test]
    async fn resubmits_after_failed_submission() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        let stage = TranscodeInitiator::new(h.ctx());

        h.encoder.fail_submissions(true);
        let first = stage.run(&input()).await.unwrap();
        assert_eq!(first.status, TranscodeStatus::Failed);

        h.encoder.fail_submissions(false);
        let again = stage.run(&input()).await.unwrap();

        assert_eq!(again.status, TranscodeStatus::Started);
        assert_eq!(again.job_id.as_deref(), Some("job-1"));
        assert_eq!(h.encoder.submissions().len(), 1);
        assert_eq!(h.repo.track("u1", "t1").unwrap().hls_status, HlsStatus::Processing);
    }

    #[tokio::test]
    async fn failed_encode_is_resubmitted() {
        let h = TestHarness::new();
        let mut track = sample_track("u1", "t1", "media/u1/t1.mp3");
        track.hls_status = HlsStatus::Failed;
        track.hls_job_id = Some("job-old".into());
        h.repo.insert_track(track);

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Started);
        assert_eq!(out.job_id.as_deref(), Some("job-1"));
        let track = h.repo.track("u1", "t1").unwrap();
        assert_eq!(track.hls_status, HlsStatus::Processing);
        assert_eq!(track.hls_job_id.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn concurrent_record_wins_over_late_submission() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        let repo = h.repo.clone();
        h.encoder.on_next_submit(move || {
            let mut winner = sample_track("u1", "t1", "media/u1/t1.mp3");
            winner.hls_status = HlsStatus::Processing;
            winner.hls_job_id = Some("job-winner".into());
            winner.hls_playlist_key = Some("hls/u1/t1/master.m3u8".into());
            repo.insert_track(winner);
        });

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Started);
        assert_eq!(out.job_id.as_deref(), Some("job-winner"));
        let track = h.repo.track("u1", "t1").unwrap();
        assert_eq!(track.hls_job_id.as_deref(), Some("job-winner"));
    }

    #[tokio::test]
    async fn late_submission_does_not_overwrite_ready() {
        let h = TestHarness::new();
        h.repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        let repo = h.repo.clone();
        h.encoder.on_next_submit(move || {
            let mut done = sample_track("u1", "t1", "media/u1/t1.mp3");
            done.hls_status = HlsStatus::Ready;
            done.hls_job_id = Some("job-winner".into());
            repo.insert_track(done);
        });

        let out = TranscodeInitiator::new(h.ctx()).run(&input()).await.unwrap();

        assert_eq!(out.status, TranscodeStatus::Skipped);
        assert_eq!(out.reason.as_deref(), Some(REASON_ALREADY_FINISHED));
        assert_eq!(h.repo.track("u1", "t1").unwrap().hls_status, HlsStatus::Ready);
    }

    #[tokio::test]
    async fn malformed_track_id_fails_before_calls() {
        let h = TestHarness::new();
        let mut payload = input();
        payload.track_id = String::new();

        let err = TranscodeInitiator::new(h.ctx()).run(&payload).await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(h.repo.total_calls(), 0);
        assert!(h.encoder.submissions().is_empty());
    }
}
