use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::upload::UploadStatus;
use crate::error::ValidationError;

/// One step of the upload pipeline.
///
/// Variants are declared in execution order; `Ord` follows [`Stage::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Register,
    Move,
    Transcode,
}

impl Stage {
    /// Transition table: each stage runs once all earlier entries completed.
    pub const ORDER: [Stage; 3] = [Stage::Register, Stage::Move, Stage::Transcode];

    pub fn first() -> Stage {
        Self::ORDER[0]
    }

    pub fn position(self) -> usize {
        match self {
            Stage::Register => 0,
            Stage::Move => 1,
            Stage::Transcode => 2,
        }
    }

    pub fn next(self) -> Option<Stage> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    /// Stages that must have completed before this one may run
    pub fn prerequisites(self) -> &'static [Stage] {
        &Self::ORDER[..self.position()]
    }

    /// Upload status while this stage is in flight
    pub fn running_status(self) -> UploadStatus {
        match self {
            Stage::Register => UploadStatus::Registering,
            Stage::Move => UploadStatus::Moving,
            Stage::Transcode => UploadStatus::Transcoding,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Register => "register",
            Stage::Move => "move",
            Stage::Transcode => "transcode",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "register" | "registering" | "create_track" => Ok(Stage::Register),
            "move" | "moving" | "move_file" => Ok(Stage::Move),
            "transcode" | "transcoding" => Ok(Stage::Transcode),
            "" => Err(ValidationError::Missing { field: "stage" }),
            other => Err(ValidationError::invalid(
                "stage",
                format!("unknown stage '{}'", other),
            )),
        }
    }
}
