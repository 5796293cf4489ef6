use std::future::Future;
use std::time::Duration;

use cadence_core::models::Stage;

use crate::error::{PipelineError, PipelineResult};

/// Run a stage future, dropping it if it outlives `limit`.
///
/// In-flight calls are abandoned without rollback; a later run of the stage
/// reconciles whatever they managed to write.
pub async fn with_deadline<T, F>(stage: Stage, limit: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                stage = %stage,
                limit_ms = limit.as_millis() as u64,
                "Stage deadline exceeded"
            );
            Err(PipelineError::DeadlineExceeded { stage, limit })
        }
    }
}
