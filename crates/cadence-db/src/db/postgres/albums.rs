use cadence_core::models::Album;
use chrono::{DateTime, Utc};
use sqlx::Postgres;

use super::{map_insert_error, PgLibraryRepository};
use crate::error::{RepositoryError, RepositoryResult};

/// Row type for the albums table
#[derive(Debug, sqlx::FromRow)]
struct AlbumRow {
    id: String,
    user_id: String,
    name: String,
    artist: String,
    track_count: i32,
    created_at: DateTime<Utc>,
}

impl AlbumRow {
    fn into_album(self) -> Album {
        Album {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            artist: self.artist,
            track_count: self.track_count,
            created_at: self.created_at,
        }
    }
}

impl PgLibraryRepository {
    #[tracing::instrument(skip(self, candidate), fields(db.table = "albums", db.operation = "upsert", album.name = %candidate.name))]
    pub(super) async fn upsert_album(&self, candidate: &Album) -> RepositoryResult<Album> {
        // Two first-tracks of a new album may race here; the unique key picks
        // one winner and both callers read it back.
        let inserted = sqlx::query(
            r#"
            INSERT INTO albums (id, user_id, name, artist, track_count, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (user_id, name, artist) DO NOTHING
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.user_id)
        .bind(&candidate.name)
        .bind(&candidate.artist)
        .bind(candidate.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_insert_error(e, "album", &candidate.id))?;

        let row = sqlx::query_as::<Postgres, AlbumRow>(
            r#"
            SELECT id, user_id, name, artist, track_count, created_at
            FROM albums
            WHERE user_id = $1 AND name = $2 AND artist = $3
            "#,
        )
        .bind(&candidate.user_id)
        .bind(&candidate.name)
        .bind(&candidate.artist)
        .fetch_optional(self.pool())
        .await?;

        let album = row
            .ok_or_else(|| RepositoryError::not_found("album", &candidate.name))?
            .into_album();

        tracing::debug!(
            album_id = %album.id,
            created = inserted.rows_affected() == 1,
            "Album resolved"
        );

        Ok(album)
    }

    #[tracing::instrument(skip(self), fields(db.table = "albums", db.operation = "select"))]
    pub(super) async fn albums_by_artist(
        &self,
        user_id: &str,
        artist: &str,
    ) -> RepositoryResult<Vec<Album>> {
        let rows = sqlx::query_as::<Postgres, AlbumRow>(
            r#"
            SELECT id, user_id, name, artist, track_count, created_at
            FROM albums
            WHERE user_id = $1 AND artist = $2
            ORDER BY name
            "#,
        )
        .bind(user_id)
        .bind(artist)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(AlbumRow::into_album).collect())
    }
}
