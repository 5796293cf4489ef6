//! Relocates an uploaded object to its canonical key.

use std::time::Instant;

use cadence_core::models::Stage;
use cadence_core::validation::{validate_bucket_name, validate_identifier, validate_object_key};
use cadence_core::ValidationError;
use cadence_storage::{extension_of, media_key};

use crate::context::PipelineContext;
use crate::error::{soft_failure, PipelineError, PipelineResult};
use crate::payloads::{MoveInput, MoveOutput};

pub struct Mover {
    ctx: PipelineContext,
}

impl Mover {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Canonical key for a track's audio: `media/{user}/{track}{ext}`
    pub fn destination_key(&self, user_id: &str, track_id: &str, source_key: &str) -> String {
        let ext = extension_of(source_key).unwrap_or(self.ctx.settings.default_extension.as_str());
        media_key(user_id, track_id, ext)
    }

    fn validate(&self, input: &MoveInput) -> Result<(), ValidationError> {
        validate_identifier(&input.user_id, "userId")?;
        validate_identifier(&input.track_id, "trackId")?;
        validate_object_key(&input.source_key, "sourceKey")?;
        validate_bucket_name(&input.bucket_name, "bucketName")?;
        if input.bucket_name != self.ctx.storage.bucket() {
            return Err(ValidationError::invalid(
                "bucketName",
                format!(
                    "'{}' is not the configured media bucket",
                    input.bucket_name
                ),
            ));
        }
        Ok(())
    }

    /// Copy the source to its canonical key, drop the source, and point the
    /// track at the new key.
    ///
    /// Safe to re-run: an existing destination skips the copy and an already
    /// correct track location skips the write.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id, track_id = %input.track_id))]
    pub async fn run(&self, input: &MoveInput) -> PipelineResult<MoveOutput> {
        self.validate(input)?;
        let start = Instant::now();

        // Fails before any object is touched if the track is missing
        let track = self
            .ctx
            .repo
            .get_track(&input.user_id, &input.track_id)
            .await?;

        let dest = self.destination_key(&input.user_id, &input.track_id, &input.source_key);

        if input.source_key != dest {
            if self.ctx.storage.exists(&dest).await? {
                tracing::debug!(dest = %dest, "Destination already present, skipping copy");
            } else {
                self.ctx.storage.copy(&input.source_key, &dest).await?;
                if !self.ctx.storage.exists(&dest).await? {
                    return Err(PipelineError::Storage(
                        cadence_storage::StorageError::CopyFailed(format!(
                            "{} missing after copy",
                            dest
                        )),
                    ));
                }
            }

            if let Err(e) = self.ctx.storage.delete(&input.source_key).await {
                soft_failure(Stage::Move, "delete_source", &e);
            }
        }

        if track.s3_key != dest {
            self.ctx
                .repo
                .set_track_location(&input.user_id, &input.track_id, &dest, self.ctx.clock.now())
                .await?;
        }

        tracing::info!(
            source_key = %input.source_key,
            new_key = %dest,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload moved to media key"
        );

        Ok(MoveOutput { new_key: dest })
    }
}
