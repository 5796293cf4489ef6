//! Creates the canonical track for an upload and files it under its album.

use std::time::Instant;

use cadence_core::models::{Album, HlsStatus, Stage, Track, UploadMetadata, UNKNOWN_ARTIST};
use cadence_core::validation::{validate_bucket_name, validate_identifier, validate_object_key};
use cadence_core::ValidationError;
use cadence_db::RepositoryError;
use chrono::{DateTime, Utc};

use crate::context::PipelineContext;
use crate::error::{soft_failure, PipelineResult};
use crate::payloads::{RegisterInput, RegisterOutput};

const DEFAULT_FORMAT: &str = "mp3";

/// Track fields after applying per-field fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFields {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
    pub duration: i32,
    pub bitrate: i32,
    pub format: String,
}

/// Each field independently: the supplied value when non-empty (or non-zero),
/// otherwise its default. Title falls back to the file name.
pub fn resolve_fields(file_name: &str, metadata: Option<&UploadMetadata>) -> ResolvedFields {
    let m = metadata.cloned().unwrap_or_default();
    let or = |value: String, default: &str| {
        if value.trim().is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    ResolvedFields {
        title: or(m.title, file_name),
        artist: or(m.artist, UNKNOWN_ARTIST),
        album: m.album.trim().to_string(),
        genre: m.genre.trim().to_string(),
        year: m.year.max(0),
        duration: m.duration.max(0),
        bitrate: m.bitrate.max(0),
        format: or(m.format, DEFAULT_FORMAT),
    }
}

pub struct TrackRegistrar {
    ctx: PipelineContext,
}

impl TrackRegistrar {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    fn validate(input: &RegisterInput) -> Result<(), ValidationError> {
        validate_identifier(&input.user_id, "userId")?;
        validate_identifier(&input.upload_id, "uploadId")?;
        validate_object_key(&input.s3_key, "s3Key")?;
        validate_bucket_name(&input.bucket_name, "bucketName")?;
        if input.file_name.trim().is_empty() {
            return Err(ValidationError::Missing { field: "fileName" });
        }
        if let Some(cover) = &input.cover_art {
            if !cover.cover_art_key.is_empty() {
                validate_object_key(&cover.cover_art_key, "coverArtKey")?;
            }
        }
        Ok(())
    }

    /// Register the upload's track, minting its identity at most once per
    /// upload.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id, upload_id = %input.upload_id))]
    pub async fn run(&self, input: &RegisterInput) -> PipelineResult<RegisterOutput> {
        Self::validate(input)?;
        let start = Instant::now();
        let now = self.ctx.clock.now();

        let (track_id, reused) = self.track_identity(input, now).await?;
        if reused {
            match self.ctx.repo.get_track(&input.user_id, &track_id).await {
                Ok(track) => return Ok(self.resume(track, now).await),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let fields = resolve_fields(&input.file_name, input.metadata.as_ref());
        let cover_art_key = input
            .cover_art
            .as_ref()
            .map(|c| c.cover_art_key.clone())
            .filter(|k| !k.is_empty());

        let track = Track {
            id: track_id.clone(),
            user_id: input.user_id.clone(),
            title: fields.title,
            artist: fields.artist,
            album: fields.album,
            album_id: None,
            genre: fields.genre,
            year: fields.year,
            duration: fields.duration,
            format: fields.format,
            bitrate: fields.bitrate,
            s3_key: input.s3_key.clone(),
            cover_art_key,
            hls_status: HlsStatus::None,
            hls_job_id: None,
            hls_playlist_key: None,
            play_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        match self.ctx.repo.create_track(&track).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyExists { .. }) => {
                // A concurrent run holding the same reservation got there first
                let existing = self.ctx.repo.get_track(&input.user_id, &track_id).await?;
                return Ok(self.resume(existing, now).await);
            }
            Err(e) => return Err(e.into()),
        }

        let album_id = if track.album.is_empty() {
            None
        } else {
            self.file_under_album(&track.user_id, &track.id, &track.album, &track.artist, now)
                .await
        };

        tracing::info!(
            track_id = %track_id,
            album_id = ?album_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Track registered"
        );

        Ok(RegisterOutput { track_id, album_id })
    }

    /// The id this upload's track lives under, and whether an earlier run may
    /// already have created it.
    ///
    /// A fresh id is reserved on the upload before the track is written, so a
    /// run that dies after `create_track` leaves its id behind for the retry.
    /// Events without an upload record get an unreserved id.
    async fn track_identity(
        &self,
        input: &RegisterInput,
        now: DateTime<Utc>,
    ) -> PipelineResult<(String, bool)> {
        let upload = match self
            .ctx
            .repo
            .get_upload(&input.user_id, &input.upload_id)
            .await
        {
            Ok(upload) => upload,
            Err(e) if e.is_not_found() => return Ok((self.ctx.ids.generate(), false)),
            Err(e) => return Err(e.into()),
        };
        if let Some(track_id) = upload.track_id {
            return Ok((track_id, true));
        }

        let minted = self.ctx.ids.generate();
        let reserved = self
            .ctx
            .repo
            .reserve_upload_track(&input.user_id, &input.upload_id, &minted, now)
            .await?;
        let reused = reserved != minted;
        Ok((reserved, reused))
    }

    /// Finish a registration an earlier run started: the track exists, but
    /// its album link may not.
    async fn resume(&self, track: Track, now: DateTime<Utc>) -> RegisterOutput {
        tracing::info!(track_id = %track.id, "Upload already registered, reusing track");
        let album_id = match track.album_id.clone() {
            Some(id) => Some(id),
            None if !track.album.is_empty() => {
                self.file_under_album(&track.user_id, &track.id, &track.album, &track.artist, now)
                    .await
            }
            None => None,
        };
        RegisterOutput {
            track_id: track.id,
            album_id,
        }
    }

    /// Find or create the album and link the track to it. Failures are soft:
    /// the track stays registered without an album id.
    async fn file_under_album(
        &self,
        user_id: &str,
        track_id: &str,
        name: &str,
        artist: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let candidate = Album {
            id: self.ctx.ids.generate(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            track_count: 0,
            created_at: now,
        };

        let result = async {
            let album = self.ctx.repo.get_or_create_album(&candidate).await?;
            let linked = self
                .ctx
                .repo
                .link_track_album(user_id, track_id, &album.id, now)
                .await?;
            if !linked {
                tracing::debug!(album_id = %album.id, "Track already linked to an album");
            }
            Ok::<_, RepositoryError>(album.id)
        }
        .await;

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                soft_failure(Stage::Register, "link_album", &e);
                None
            }
        }
    }
}
