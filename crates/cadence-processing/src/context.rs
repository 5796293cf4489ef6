//! Shared collaborators handed to every stage.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Clock, Config, IdGenerator, SystemClock, UuidIdGenerator};
use cadence_db::LibraryRepository;
use cadence_storage::Storage;

use crate::transcode::Encoder;

/// Tunables a stage needs at run time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub default_extension: String,
    pub stage_deadline: Duration,
    pub hls_output_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_extension: ".mp3".to_string(),
            stage_deadline: Duration::from_secs(55),
            hls_output_prefix: "hls".to_string(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_extension: config.default_audio_extension.clone(),
            stage_deadline: config.stage_deadline(),
            hls_output_prefix: config.hls_output_prefix.clone(),
        }
    }
}

/// Clients built once by the entry point. Cloning is cheap.
#[derive(Clone)]
pub struct PipelineContext {
    pub repo: Arc<dyn LibraryRepository>,
    pub storage: Arc<dyn Storage>,
    /// `None` when no encoder is configured; transcoding is then skipped
    pub encoder: Option<Arc<dyn Encoder>>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        repo: Arc<dyn LibraryRepository>,
        storage: Arc<dyn Storage>,
        encoder: Option<Arc<dyn Encoder>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            repo,
            storage,
            encoder,
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
