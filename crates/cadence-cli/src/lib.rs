//! Shared plumbing for the `cadence` binary: client construction and event
//! decoding.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_core::Config;
use cadence_db::PgLibraryRepository;
use cadence_processing::{Encoder, PipelineContext, PipelineSettings};
use serde::de::DeserializeOwned;

/// Build every client once from configuration.
pub async fn build_context(config: &Config) -> Result<PipelineContext> {
    let pool = cadence_db::connect(config).await?;
    let repo = Arc::new(PgLibraryRepository::new(pool));

    let storage = cadence_storage::create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;

    let encoder = build_encoder(config).await?;
    if encoder.is_none() {
        tracing::warn!("MEDIACONVERT_ENDPOINT/MEDIACONVERT_ROLE not set, transcoding disabled");
    }

    Ok(PipelineContext::new(
        repo,
        storage,
        encoder,
        PipelineSettings::from(config),
    ))
}

async fn build_encoder(config: &Config) -> Result<Option<Arc<dyn Encoder>>> {
    let Some(encoder_config) = &config.encoder else {
        return Ok(None);
    };
    let encoder = cadence_processing::MediaConvertEncoder::from_config(encoder_config)
        .await
        .context("Failed to create MediaConvert client")?;
    Ok(Some(Arc::new(encoder)))
}

/// Decode a stage event from a file, or from stdin when no path is given.
pub fn read_event<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read event from stdin")?;
            buf
        }
    };
    parse_event(&raw)
}

pub fn parse_event<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).context("Event is not valid JSON for this stage")
}
