//! Test helpers for pipeline unit tests
//!
//! In-memory stand-ins for every collaborator in a [`PipelineContext`], with
//! call counters and failure injection. No database or bucket is needed.

pub mod fixtures;
pub mod mock_encoder;
pub mod mock_repositories;
pub mod mock_storage;

pub use fixtures::*;
pub use mock_encoder::FakeEncoder;
pub use mock_repositories::MemoryRepository;
pub use mock_storage::MemoryStorage;

use std::sync::Arc;
use std::time::Duration;

use crate::context::{PipelineContext, PipelineSettings};

pub const TEST_BUCKET: &str = "cadence-media";

/// Shared fakes plus a way to build contexts over them.
pub struct TestHarness {
    pub repo: Arc<MemoryRepository>,
    pub storage: Arc<MemoryStorage>,
    pub encoder: Arc<FakeEncoder>,
    pub ids: Arc<SequentialIds>,
    pub clock: Arc<FixedClock>,
    pub settings: PipelineSettings,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new()),
            storage: Arc::new(MemoryStorage::new(TEST_BUCKET)),
            encoder: Arc::new(FakeEncoder::new()),
            ids: Arc::new(SequentialIds::new()),
            clock: Arc::new(FixedClock::default()),
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.settings.stage_deadline = limit;
        self
    }

    pub fn ctx(&self) -> PipelineContext {
        self.ctx_without_encoder()
            .with_encoder(self.encoder.clone())
    }

    pub fn ctx_without_encoder(&self) -> PipelineContext {
        PipelineContext::new(
            self.repo.clone(),
            self.storage.clone(),
            None,
            self.settings.clone(),
        )
        .with_ids(self.ids.clone())
        .with_clock(self.clock.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
