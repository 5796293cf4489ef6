use async_trait::async_trait;
use cadence_core::models::{
    Album, HlsUpdate, Stage, StageRecord, Track, Upload, UploadProgress,
};
use chrono::{DateTime, Utc};

use crate::error::RepositoryResult;

/// Library storage used by the pipeline stages.
///
/// Records are addressed by `(user_id, id)`. Only `create_*` and
/// `update_track` write whole records; every other write touches exactly the
/// fields it names so stages writing disjoint fields of the same track cannot
/// lose each other's updates.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn get_track(&self, user_id: &str, track_id: &str) -> RepositoryResult<Track>;

    /// Insert a new track; `AlreadyExists` if the id is taken.
    async fn create_track(&self, track: &Track) -> RepositoryResult<()>;

    /// Replace every mutable field of a track if its stored version still
    /// equals `track.version`. Returns the stored record with the new version.
    async fn update_track(&self, track: &Track, now: DateTime<Utc>) -> RepositoryResult<Track>;

    async fn set_track_location(
        &self,
        user_id: &str,
        track_id: &str,
        s3_key: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Write the HLS fields if the stored state allows it (see [`HlsUpdate`]).
    /// Returns false when another writer moved the track first.
    async fn set_track_hls(
        &self,
        user_id: &str,
        track_id: &str,
        update: &HlsUpdate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Attach a track to an album if it has none yet, bumping the album's
    /// track count in the same transaction. Returns whether the link was made.
    async fn link_track_album(
        &self,
        user_id: &str,
        track_id: &str,
        album_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Insert `candidate` unless an album with the same (user, name, artist)
    /// exists, then return whichever record won.
    async fn get_or_create_album(&self, candidate: &Album) -> RepositoryResult<Album>;

    async fn list_tracks_by_artist(&self, user_id: &str, artist: &str)
        -> RepositoryResult<Vec<Track>>;

    async fn list_albums_by_artist(&self, user_id: &str, artist: &str)
        -> RepositoryResult<Vec<Album>>;

    async fn create_upload(&self, upload: &Upload) -> RepositoryResult<()>;

    async fn get_upload(&self, user_id: &str, upload_id: &str) -> RepositoryResult<Upload>;

    /// Record `track_id` as the upload's track unless one is already set.
    /// Returns the id the upload carries afterwards.
    async fn reserve_upload_track(
        &self,
        user_id: &str,
        upload_id: &str,
        track_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<String>;

    /// Write status, current stage and last error. A `complete` status also
    /// stamps `completed_at`.
    async fn update_upload_progress(
        &self,
        user_id: &str,
        upload_id: &str,
        progress: &UploadProgress,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Persist a stage's outputs and add it to the completed set.
    async fn record_stage_completion(
        &self,
        user_id: &str,
        upload_id: &str,
        record: &StageRecord,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Move a `failed` upload back to `pending` at `stage`. Returns false if
    /// the upload was not failed (e.g. a concurrent reprocess got there first).
    async fn begin_reprocess(
        &self,
        user_id: &str,
        upload_id: &str,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool>;
}
