use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// HLS rendition state of a track.
///
/// `none -> processing` is written by the transcode stage; `processing ->
/// ready|failed` belongs to the encoder's completion handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HlsStatus {
    #[default]
    None,
    Processing,
    Ready,
    Failed,
}

impl HlsStatus {
    /// States a track may be in for `self` to be written over them.
    pub fn predecessors(self) -> &'static [HlsStatus] {
        match self {
            HlsStatus::None => &[],
            HlsStatus::Processing => &[HlsStatus::None, HlsStatus::Failed],
            HlsStatus::Ready | HlsStatus::Failed => &[HlsStatus::Processing],
        }
    }

    pub fn can_transition_to(self, next: HlsStatus) -> bool {
        next.predecessors().contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HlsStatus::None => "none",
            HlsStatus::Processing => "processing",
            HlsStatus::Ready => "ready",
            HlsStatus::Failed => "failed",
        }
    }
}

impl Display for HlsStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for HlsStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(HlsStatus::None),
            "processing" => Ok(HlsStatus::Processing),
            "ready" => Ok(HlsStatus::Ready),
            "failed" => Ok(HlsStatus::Failed),
            other => Err(ValidationError::invalid(
                "hlsStatus",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Canonical library entry for one uploaded audio file.
///
/// Field ownership after creation: the mover writes `s3_key`, the transcode
/// stage writes the `hls_*` fields, album linking writes `album_id`. Each goes
/// through its own field-scoped repository update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    pub genre: String,
    pub year: i32,
    /// Seconds
    pub duration: i32,
    pub format: String,
    /// kbps
    pub bitrate: i32,
    pub s3_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art_key: Option<String>,
    pub hls_status: HlsStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_playlist_key: Option<String>,
    pub play_count: i32,
    /// Bumped by every write; guards full-record replacement
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update owned by the transcode stage.
///
/// Applied only when the stored status is one of `status.predecessors()`.
/// Leaving `processing` additionally requires the stored job id to equal
/// `job_id`, so a result for a superseded job cannot land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsUpdate {
    pub status: HlsStatus,
    pub job_id: Option<String>,
    pub playlist_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_transitions() {
        assert!(HlsStatus::None.can_transition_to(HlsStatus::Processing));
        assert!(HlsStatus::Processing.can_transition_to(HlsStatus::Ready));
        assert!(HlsStatus::Processing.can_transition_to(HlsStatus::Failed));
        assert!(HlsStatus::Failed.can_transition_to(HlsStatus::Processing));
        assert!(!HlsStatus::None.can_transition_to(HlsStatus::Ready));
        assert!(!HlsStatus::Ready.can_transition_to(HlsStatus::Processing));
        assert!(!HlsStatus::Processing.can_transition_to(HlsStatus::Processing));
        assert!(!HlsStatus::Ready.can_transition_to(HlsStatus::None));
        assert!(HlsStatus::None.predecessors().is_empty());
    }

    #[test]
    fn hls_status_text_form() {
        for status in [
            HlsStatus::None,
            HlsStatus::Processing,
            HlsStatus::Ready,
            HlsStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<HlsStatus>().unwrap(), status);
        }
        assert_eq!("PROCESSING".parse::<HlsStatus>().unwrap(), HlsStatus::Processing);
        assert!("queued".parse::<HlsStatus>().is_err());
    }
}
