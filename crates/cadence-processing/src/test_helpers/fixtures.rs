//! Deterministic ids, a pinned clock and record builders

use std::sync::atomic::{AtomicUsize, Ordering};

use cadence_core::models::{HlsStatus, Track, Upload, UploadMetadata};
use cadence_core::{Clock, IdGenerator};
use chrono::{DateTime, Utc};

use super::TEST_BUCKET;

/// Yields `id-1`, `id-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        format!("id-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        FixedClock(fixed_time())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 2026-01-01T00:00:00Z
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_default()
}

pub fn sample_track(user_id: &str, track_id: &str, s3_key: &str) -> Track {
    Track {
        id: track_id.to_string(),
        user_id: user_id.to_string(),
        title: "Song".to_string(),
        artist: "Artist".to_string(),
        album: String::new(),
        album_id: None,
        genre: String::new(),
        year: 0,
        duration: 180,
        format: "mp3".to_string(),
        bitrate: 320,
        s3_key: s3_key.to_string(),
        cover_art_key: None,
        hls_status: HlsStatus::None,
        hls_job_id: None,
        hls_playlist_key: None,
        play_count: 0,
        version: 1,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub fn sample_upload(user_id: &str, upload_id: &str, source_key: &str) -> Upload {
    let file_name = source_key.rsplit('/').next().unwrap_or(source_key);
    Upload::new(
        upload_id.to_string(),
        user_id.to_string(),
        source_key.to_string(),
        TEST_BUCKET.to_string(),
        file_name.to_string(),
        UploadMetadata::default(),
        None,
        fixed_time(),
    )
}
