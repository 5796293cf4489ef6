use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Album grouping, unique per (user_id, name, artist).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub artist: String,
    pub track_count: i32,
    pub created_at: DateTime<Utc>,
}
