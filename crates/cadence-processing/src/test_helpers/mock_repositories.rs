//! In-memory library repository
//!
//! Mirrors the Postgres semantics the stages depend on: album uniqueness on
//! (user, name, artist), link-once album attachment, guarded HLS writes,
//! first-writer track reservation and the failed-only reprocess transition.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cadence_core::models::{
    Album, HlsStatus, HlsUpdate, Stage, StageRecord, Track, Upload, UploadProgress, UploadStatus,
};
use cadence_db::{LibraryRepository, RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};

type Key = (String, String);

fn key(user_id: &str, id: &str) -> Key {
    (user_id.to_string(), id.to_string())
}

#[derive(Default)]
pub struct MemoryRepository {
    tracks: Arc<Mutex<HashMap<Key, Track>>>,
    albums: Arc<Mutex<HashMap<Key, Album>>>,
    uploads: Arc<Mutex<HashMap<Key, Upload>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    progress: Mutex<HashMap<String, Vec<UploadStatus>>>,
    reprocess_conflict: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_track(&self, track: Track) {
        self.tracks
            .lock()
            .unwrap()
            .insert(key(&track.user_id, &track.id), track);
    }

    pub fn track(&self, user_id: &str, track_id: &str) -> Option<Track> {
        self.tracks.lock().unwrap().get(&key(user_id, track_id)).cloned()
    }

    pub fn albums(&self, user_id: &str) -> Vec<Album> {
        let mut albums: Vec<Album> = self
            .albums
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        albums.sort_by(|a, b| a.name.cmp(&b.name));
        albums
    }

    pub fn insert_upload(&self, upload: Upload) {
        self.uploads
            .lock()
            .unwrap()
            .insert(key(&upload.user_id, &upload.id), upload);
    }

    pub fn upload(&self, user_id: &str, upload_id: &str) -> Option<Upload> {
        self.uploads.lock().unwrap().get(&key(user_id, upload_id)).cloned()
    }

    /// Statuses written for an upload, in order
    pub fn progress_history(&self, upload_id: &str) -> Vec<UploadStatus> {
        self.progress
            .lock()
            .unwrap()
            .get(upload_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make `op` fail with a database error from now on
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Undo an earlier `fail_on`
    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Make the next `begin_reprocess` behave as if another caller won
    pub fn force_reprocess_conflict(&self) {
        self.reprocess_conflict.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn enter(&self, op: &'static str) -> RepositoryResult<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        if self.failing.lock().unwrap().contains(op) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn with_track<T>(
        &self,
        user_id: &str,
        track_id: &str,
        f: impl FnOnce(&mut Track) -> T,
    ) -> RepositoryResult<T> {
        let mut tracks = self.tracks.lock().unwrap();
        let track = tracks
            .get_mut(&key(user_id, track_id))
            .ok_or_else(|| RepositoryError::not_found("track", track_id))?;
        Ok(f(track))
    }

    fn with_upload<T>(
        &self,
        user_id: &str,
        upload_id: &str,
        f: impl FnOnce(&mut Upload) -> T,
    ) -> RepositoryResult<T> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(&key(user_id, upload_id))
            .ok_or_else(|| RepositoryError::not_found("upload", upload_id))?;
        Ok(f(upload))
    }
}

#[async_trait]
impl LibraryRepository for MemoryRepository {
    async fn get_track(&self, user_id: &str, track_id: &str) -> RepositoryResult<Track> {
        self.enter("get_track")?;
        self.track(user_id, track_id)
            .ok_or_else(|| RepositoryError::not_found("track", track_id))
    }

    async fn create_track(&self, track: &Track) -> RepositoryResult<()> {
        self.enter("create_track")?;
        let mut tracks = self.tracks.lock().unwrap();
        let k = key(&track.user_id, &track.id);
        if tracks.contains_key(&k) {
            return Err(RepositoryError::AlreadyExists {
                entity: "track",
                id: track.id.clone(),
            });
        }
        tracks.insert(k, track.clone());
        Ok(())
    }

    async fn update_track(&self, track: &Track, now: DateTime<Utc>) -> RepositoryResult<Track> {
        self.enter("update_track")?;
        let mut tracks = self.tracks.lock().unwrap();
        let stored = tracks
            .get_mut(&key(&track.user_id, &track.id))
            .ok_or_else(|| RepositoryError::not_found("track", &track.id))?;
        if stored.version != track.version {
            return Err(RepositoryError::VersionConflict {
                entity: "track",
                id: track.id.clone(),
                expected: track.version,
            });
        }
        let mut next = track.clone();
        next.version = track.version + 1;
        next.created_at = stored.created_at;
        next.updated_at = now;
        *stored = next.clone();
        Ok(next)
    }

    async fn set_track_location(
        &self,
        user_id: &str,
        track_id: &str,
        s3_key: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.enter("set_track_location")?;
        self.with_track(user_id, track_id, |t| {
            t.s3_key = s3_key.to_string();
            t.version += 1;
            t.updated_at = now;
        })
    }

    async fn set_track_hls(
        &self,
        user_id: &str,
        track_id: &str,
        update: &HlsUpdate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.enter("set_track_hls")?;
        self.with_track(user_id, track_id, |t| {
            let allowed = update.status.predecessors().contains(&t.hls_status)
                && (t.hls_status != HlsStatus::Processing || t.hls_job_id == update.job_id);
            if !allowed {
                return false;
            }
            t.hls_status = update.status;
            t.hls_job_id = update.job_id.clone();
            t.hls_playlist_key = update.playlist_key.clone();
            t.version += 1;
            t.updated_at = now;
            true
        })
    }

    async fn link_track_album(
        &self,
        user_id: &str,
        track_id: &str,
        album_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.enter("link_track_album")?;
        let mut albums = self.albums.lock().unwrap();
        let album = albums
            .get_mut(&key(user_id, album_id))
            .ok_or_else(|| RepositoryError::not_found("album", album_id))?;
        let linked = self.with_track(user_id, track_id, |t| {
            if t.album_id.is_some() {
                return false;
            }
            t.album_id = Some(album_id.to_string());
            t.version += 1;
            t.updated_at = now;
            true
        })?;
        if linked {
            album.track_count += 1;
        }
        Ok(linked)
    }

    async fn get_or_create_album(&self, candidate: &Album) -> RepositoryResult<Album> {
        self.enter("get_or_create_album")?;
        let mut albums = self.albums.lock().unwrap();
        if let Some(existing) = albums.values().find(|a| {
            a.user_id == candidate.user_id
                && a.name == candidate.name
                && a.artist == candidate.artist
        }) {
            return Ok(existing.clone());
        }
        albums.insert(key(&candidate.user_id, &candidate.id), candidate.clone());
        Ok(candidate.clone())
    }

    async fn list_tracks_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Track>> {
        self.enter("list_tracks_by_artist")?;
        let mut tracks: Vec<Track> = self
            .tracks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id && t.artist == artist)
            .cloned()
            .collect();
        tracks.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(tracks)
    }

    async fn list_albums_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Album>> {
        self.enter("list_albums_by_artist")?;
        Ok(self
            .albums(user_id)
            .into_iter()
            .filter(|a| a.artist == artist)
            .collect())
    }

    async fn create_upload(&self, upload: &Upload) -> RepositoryResult<()> {
        self.enter("create_upload")?;
        let mut uploads = self.uploads.lock().unwrap();
        let k = key(&upload.user_id, &upload.id);
        if uploads.contains_key(&k) {
            return Err(RepositoryError::AlreadyExists {
                entity: "upload",
                id: upload.id.clone(),
            });
        }
        uploads.insert(k, upload.clone());
        Ok(())
    }

    async fn get_upload(&self, user_id: &str, upload_id: &str) -> RepositoryResult<Upload> {
        self.enter("get_upload")?;
        self.upload(user_id, upload_id)
            .ok_or_else(|| RepositoryError::not_found("upload", upload_id))
    }

    async fn reserve_upload_track(
        &self,
        user_id: &str,
        upload_id: &str,
        track_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        self.enter("reserve_upload_track")?;
        self.with_upload(user_id, upload_id, |u| {
            u.updated_at = now;
            u.track_id
                .get_or_insert_with(|| track_id.to_string())
                .clone()
        })
    }

    async fn update_upload_progress(
        &self,
        user_id: &str,
        upload_id: &str,
        progress: &UploadProgress,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.enter("update_upload_progress")?;
        self.with_upload(user_id, upload_id, |u| {
            u.status = progress.status;
            u.current_stage = progress.current_stage;
            u.last_error = progress.last_error.clone();
            u.updated_at = now;
            if progress.status == UploadStatus::Complete && u.completed_at.is_none() {
                u.completed_at = Some(now);
            }
        })?;
        self.progress
            .lock()
            .unwrap()
            .entry(upload_id.to_string())
            .or_default()
            .push(progress.status);
        Ok(())
    }

    async fn record_stage_completion(
        &self,
        user_id: &str,
        upload_id: &str,
        record: &StageRecord,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.enter("record_stage_completion")?;
        self.with_upload(user_id, upload_id, |u| {
            record.apply(u);
            u.updated_at = now;
        })
    }

    async fn begin_reprocess(
        &self,
        user_id: &str,
        upload_id: &str,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.enter("begin_reprocess")?;
        let lost = self.reprocess_conflict.swap(false, Ordering::SeqCst);
        self.with_upload(user_id, upload_id, |u| {
            if lost || u.status != UploadStatus::Failed {
                return false;
            }
            u.status = UploadStatus::Pending;
            u.current_stage = Some(stage);
            u.last_error = None;
            u.updated_at = now;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{fixed_time, sample_track, sample_upload};

    fn album(id: &str) -> Album {
        Album {
            id: id.to_string(),
            user_id: "u1".into(),
            name: "Demo".into(),
            artist: "Nina".into(),
            track_count: 0,
            created_at: fixed_time(),
        }
    }

    #[tokio::test]
    async fn album_candidates_converge() {
        let repo = MemoryRepository::new();
        let first = repo.get_or_create_album(&album("a1")).await.unwrap();
        let second = repo.get_or_create_album(&album("a2")).await.unwrap();
        assert_eq!(first.id, "a1");
        assert_eq!(second.id, "a1");
    }

    #[tokio::test]
    async fn link_counts_once() {
        let repo = MemoryRepository::new();
        repo.insert_track(sample_track("u1", "t1", "media/u1/t1.mp3"));
        repo.get_or_create_album(&album("a1")).await.unwrap();

        assert!(repo.link_track_album("u1", "t1", "a1", fixed_time()).await.unwrap());
        assert!(!repo.link_track_album("u1", "t1", "a1", fixed_time()).await.unwrap());
        assert_eq!(repo.albums("u1")[0].track_count, 1);
    }

    #[tokio::test]
    async fn hls_write_rejects_stale_transition() {
        let repo = MemoryRepository::new();
        let mut track = sample_track("u1", "t1", "media/u1/t1.mp3");
        track.hls_status = HlsStatus::Ready;
        track.hls_job_id = Some("job-1".into());
        repo.insert_track(track);

        let update = HlsUpdate {
            status: HlsStatus::Processing,
            job_id: Some("job-2".into()),
            playlist_key: None,
        };
        assert!(!repo.set_track_hls("u1", "t1", &update, fixed_time()).await.unwrap());

        let stored = repo.track("u1", "t1").unwrap();
        assert_eq!(stored.hls_status, HlsStatus::Ready);
        assert_eq!(stored.hls_job_id.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn track_reservation_keeps_first_id() {
        let repo = MemoryRepository::new();
        repo.insert_upload(sample_upload("u1", "up-1", "uploads/u1/a.mp3"));

        let first = repo.reserve_upload_track("u1", "up-1", "t1", fixed_time()).await.unwrap();
        let second = repo.reserve_upload_track("u1", "up-1", "t2", fixed_time()).await.unwrap();

        assert_eq!(first, "t1");
        assert_eq!(second, "t1");
    }

    #[tokio::test]
    async fn update_track_is_version_guarded() {
        let repo = MemoryRepository::new();
        let track = sample_track("u1", "t1", "media/u1/t1.mp3");
        repo.insert_track(track.clone());
        repo.set_track_location("u1", "t1", "media/u1/t1.wav", fixed_time())
            .await
            .unwrap();

        let err = repo.update_track(&track, fixed_time()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::VersionConflict { .. }));
    }
}
