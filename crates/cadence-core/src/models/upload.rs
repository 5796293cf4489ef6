use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;
use crate::error::ValidationError;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Moving,
    Registering,
    Transcoding,
    Complete,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Moving => "moving",
            UploadStatus::Registering => "registering",
            UploadStatus::Transcoding => "transcoding",
            UploadStatus::Complete => "complete",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Complete | UploadStatus::Failed)
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UploadStatus::Pending),
            "moving" => Ok(UploadStatus::Moving),
            "registering" => Ok(UploadStatus::Registering),
            "transcoding" => Ok(UploadStatus::Transcoding),
            "complete" | "completed" => Ok(UploadStatus::Complete),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(ValidationError::invalid(
                "status",
                format!("unknown upload status '{}'", other),
            )),
        }
    }
}

/// Where and why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// `None` when the failure was reported by the orchestration engine
    pub stage: Option<Stage>,
    pub message: String,
}

/// Tag metadata supplied with an upload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
    /// Seconds
    pub duration: i32,
    /// kbps
    pub bitrate: i32,
    pub format: String,
}

/// One upload and everything the stages persisted about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub source_key: String,
    pub bucket: String,
    pub file_name: String,
    pub metadata: UploadMetadata,
    pub cover_art_key: Option<String>,
    pub status: UploadStatus,
    pub current_stage: Option<Stage>,
    pub last_error: Option<StageError>,
    pub track_id: Option<String>,
    pub album_id: Option<String>,
    pub moved_key: Option<String>,
    pub hls_job_id: Option<String>,
    /// Kept sorted in stage order
    pub completed_stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Upload {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        user_id: String,
        source_key: String,
        bucket: String,
        file_name: String,
        metadata: UploadMetadata,
        cover_art_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Upload {
            id,
            user_id,
            source_key,
            bucket,
            file_name,
            metadata,
            cover_art_key,
            status: UploadStatus::Pending,
            current_stage: None,
            last_error: None,
            track_id: None,
            album_id: None,
            moved_key: None,
            hls_job_id: None,
            completed_stages: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn has_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Prerequisites of `stage` not yet recorded as completed
    pub fn missing_prerequisites(&self, stage: Stage) -> Vec<Stage> {
        stage
            .prerequisites()
            .iter()
            .copied()
            .filter(|s| !self.has_completed(*s))
            .collect()
    }

    /// Key the audio currently lives at
    pub fn current_key(&self) -> &str {
        self.moved_key.as_deref().unwrap_or(&self.source_key)
    }
}

/// Status transition written by the orchestrator around every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub status: UploadStatus,
    pub current_stage: Option<Stage>,
    pub last_error: Option<StageError>,
}

impl UploadProgress {
    pub fn running(stage: Stage) -> Self {
        UploadProgress {
            status: stage.running_status(),
            current_stage: Some(stage),
            last_error: None,
        }
    }

    pub fn failed(stage: Option<Stage>, message: impl Into<String>) -> Self {
        UploadProgress {
            status: UploadStatus::Failed,
            current_stage: stage,
            last_error: Some(StageError {
                stage,
                message: message.into(),
            }),
        }
    }

    pub fn complete() -> Self {
        UploadProgress {
            status: UploadStatus::Complete,
            current_stage: None,
            last_error: None,
        }
    }
}

/// Outputs a stage persists on the upload when it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRecord {
    Registered {
        track_id: String,
        album_id: Option<String>,
    },
    Moved {
        moved_key: String,
    },
    Transcode {
        job_id: Option<String>,
    },
}

impl StageRecord {
    pub fn stage(&self) -> Stage {
        match self {
            StageRecord::Registered { .. } => Stage::Register,
            StageRecord::Moved { .. } => Stage::Move,
            StageRecord::Transcode { .. } => Stage::Transcode,
        }
    }

    /// Apply the record to an in-memory upload the way the repository does.
    pub fn apply(&self, upload: &mut Upload) {
        match self {
            StageRecord::Registered { track_id, album_id } => {
                upload.track_id = Some(track_id.clone());
                upload.album_id = album_id.clone();
            }
            StageRecord::Moved { moved_key } => {
                upload.moved_key = Some(moved_key.clone());
            }
            StageRecord::Transcode { job_id } => {
                if job_id.is_some() {
                    upload.hls_job_id = job_id.clone();
                }
            }
        }
        let stage = self.stage();
        if !upload.completed_stages.contains(&stage) {
            upload.completed_stages.push(stage);
            upload.completed_stages.sort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> Upload {
        Upload::new(
            "up-1".into(),
            "u1".into(),
            "uploads/u1/song.wav".into(),
            "cadence-media".into(),
            "song.wav".into(),
            UploadMetadata::default(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn metadata_fields_default_when_absent() {
        let meta: UploadMetadata = serde_json::from_str(r#"{"album":"Demo"}"#).unwrap();
        assert_eq!(meta.album, "Demo");
        assert_eq!(meta.title, "");
        assert_eq!(meta.year, 0);
    }

    #[test]
    fn stage_records_accumulate_in_order() {
        let mut upload = upload();
        StageRecord::Moved {
            moved_key: "media/u1/t1.wav".into(),
        }
        .apply(&mut upload);
        StageRecord::Registered {
            track_id: "t1".into(),
            album_id: None,
        }
        .apply(&mut upload);
        StageRecord::Moved {
            moved_key: "media/u1/t1.wav".into(),
        }
        .apply(&mut upload);

        assert_eq!(upload.completed_stages, vec![Stage::Register, Stage::Move]);
        assert_eq!(upload.current_key(), "media/u1/t1.wav");
        assert!(upload.missing_prerequisites(Stage::Transcode).is_empty());
    }

    #[test]
    fn missing_prerequisites() {
        let upload = upload();
        assert_eq!(
            upload.missing_prerequisites(Stage::Transcode),
            vec![Stage::Register, Stage::Move]
        );
        assert!(upload.missing_prerequisites(Stage::Register).is_empty());
    }

    #[test]
    fn status_parse_accepts_engine_spelling() {
        assert_eq!(
            "COMPLETED".parse::<UploadStatus>().unwrap(),
            UploadStatus::Complete
        );
        assert!(UploadStatus::Failed.is_terminal());
        assert!(!UploadStatus::Moving.is_terminal());
    }
}
