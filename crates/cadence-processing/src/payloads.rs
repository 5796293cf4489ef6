//! Stage event payloads.
//!
//! These are the JSON documents the orchestration engine passes between
//! stages. Field names are camelCase on the wire; missing fields deserialize
//! to their defaults and are rejected by stage validation instead of by serde.

use cadence_core::models::UploadMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveInput {
    pub upload_id: String,
    pub user_id: String,
    pub source_key: String,
    pub track_id: String,
    pub bucket_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutput {
    pub new_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverArt {
    pub cover_art_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterInput {
    pub upload_id: String,
    pub user_id: String,
    pub s3_key: String,
    pub file_name: String,
    pub metadata: Option<UploadMetadata>,
    pub cover_art: Option<CoverArt>,
    pub bucket_name: String,
    /// Accepted for wire compatibility; the repository is injected
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOutput {
    pub track_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscodeInput {
    pub track_id: String,
    pub user_id: String,
    pub s3_key: String,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeStatus {
    Started,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_key: Option<String>,
    pub status: TranscodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TranscodeOutput {
    pub fn started(job_id: String, playlist_key: Option<String>) -> Self {
        Self {
            job_id: Some(job_id),
            playlist_key,
            status: TranscodeStatus::Started,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            job_id: None,
            playlist_key: None,
            status: TranscodeStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            job_id: None,
            playlist_key: None,
            status: TranscodeStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Error object the orchestration engine attaches to a failed execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(rename = "Cause", default)]
    pub cause: String,
}

impl EngineError {
    /// `"<Error>: <Cause>"`, or just the error when there is no cause
    pub fn message(&self) -> String {
        if self.cause.is_empty() {
            self.error.clone()
        } else {
            format!("{}: {}", self.error, self.cause)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusInput {
    pub upload_id: String,
    pub user_id: String,
    pub track_id: Option<String>,
    /// `COMPLETED` or `FAILED`
    pub status: String,
    pub error: Option<EngineError>,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_input_accepts_engine_event() {
        let input: RegisterInput = serde_json::from_value(json!({
            "uploadId": "up-1",
            "userId": "u1",
            "s3Key": "uploads/u1/song.wav",
            "fileName": "song.wav",
            "metadata": { "album": "Demo", "year": 2020 },
            "coverArt": { "coverArtKey": "covers/u1/song.jpg" },
            "bucketName": "cadence-media",
            "tableName": "tracks"
        }))
        .unwrap();

        let metadata = input.metadata.unwrap();
        assert_eq!(metadata.album, "Demo");
        assert_eq!(metadata.year, 2020);
        assert_eq!(metadata.title, "");
        assert_eq!(input.cover_art.unwrap().cover_art_key, "covers/u1/song.jpg");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let input: MoveInput = serde_json::from_value(json!({ "userId": "u1" })).unwrap();
        assert_eq!(input.user_id, "u1");
        assert!(input.track_id.is_empty());
    }

    #[test]
    fn transcode_output_omits_absent_fields() {
        let value = serde_json::to_value(TranscodeOutput::skipped("transcode_disabled")).unwrap();
        assert_eq!(
            value,
            json!({ "status": "skipped", "reason": "transcode_disabled" })
        );
    }

    #[test]
    fn engine_error_message() {
        let err: EngineError =
            serde_json::from_value(json!({ "Error": "States.Timeout", "Cause": "took too long" }))
                .unwrap();
        assert_eq!(err.message(), "States.Timeout: took too long");

        let err: EngineError = serde_json::from_value(json!({ "Error": "Lambda.Unknown" })).unwrap();
        assert_eq!(err.message(), "Lambda.Unknown");
    }
}
