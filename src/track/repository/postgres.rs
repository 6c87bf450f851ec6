use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use super::{TrackRepository, TrackTransaction};
use crate::shared::AppError;
use crate::track::models::{
    DjModel, NewDj, NewSong, NewVote, SongModel, SongWithVotes, TrackModel, VoteCategory,
    VoteModel,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const DJ_COLUMNS: &str = "id, track_id, name, avatar, score, ranking";
const SONG_COLUMNS: &str = "id, track_id, dj_id, uri, name, artist, cover, points_applied";
const VOTE_COLUMNS: &str = "id, track_id, dj_id, song_id, category";

fn has_sqlstate(e: &sqlx::Error, code: &str) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
        _ => false,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    has_sqlstate(e, UNIQUE_VIOLATION)
}

fn vote_from_row(row: &PgRow) -> Result<VoteModel, AppError> {
    let category: String = row.try_get("category")?;
    let category = VoteCategory::from_str(&category)
        .map_err(|_| AppError::DatabaseError(format!("Unknown vote category '{}'", category)))?;

    Ok(VoteModel {
        id: row.try_get("id")?,
        track_id: row.try_get("track_id")?,
        dj_id: row.try_get("dj_id")?,
        song_id: row.try_get("song_id")?,
        category,
    })
}

fn group_votes(songs: Vec<SongModel>, votes: Vec<VoteModel>) -> Vec<SongWithVotes> {
    let mut by_song: HashMap<i64, Vec<VoteModel>> = HashMap::new();
    for vote in votes {
        by_song.entry(vote.song_id).or_default().push(vote);
    }

    songs
        .into_iter()
        .map(|song| {
            let votes = by_song.remove(&song.id).unwrap_or_default();
            SongWithVotes { song, votes }
        })
        .collect()
}

/// PostgreSQL implementation of track repository
pub struct PostgresTrackRepository {
    pool: PgPool,
}

impl PostgresTrackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }
}

#[async_trait]
impl TrackRepository for PostgresTrackRepository {
    #[instrument(skip(self, track))]
    async fn create_track(&self, track: &TrackModel) -> Result<(), AppError> {
        debug!(track_id = track.id, "Creating track in database");

        sqlx::query(
            "INSERT INTO tracks (id, name, refresh_token, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(track.id)
        .bind(&track.name)
        .bind(&track.refresh_token)
        .bind(track.created_at)
        .bind(track.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Track already exists".to_string())
            } else {
                warn!(error = %e, "Failed to create track in database");
                AppError::DatabaseError(e.to_string())
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_track(&self, track_id: i64) -> Result<Option<TrackModel>, AppError> {
        let track = sqlx::query_as::<_, TrackModel>(
            "SELECT id, name, refresh_token, created_at, updated_at FROM tracks WHERE id = $1",
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }

    async fn find_tracks_needing_check(&self) -> Result<Vec<TrackModel>, AppError> {
        let tracks = sqlx::query_as::<_, TrackModel>(
            "SELECT id, name, refresh_token, created_at, updated_at FROM tracks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn find_idle_tracks(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
        let rows = sqlx::query("SELECT id FROM tracks WHERE updated_at < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(AppError::from))
            .collect()
    }

    #[instrument(skip(self))]
    async fn touch_track(&self, track_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracks SET updated_at = NOW() WHERE id = $1")
            .bind(track_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Track not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_track(&self, track_id: i64) -> Result<(), AppError> {
        debug!(track_id, "Deleting track from database");

        // djs, songs and votes go with it through ON DELETE CASCADE, departed DJs included
        let result = sqlx::query("DELETE FROM tracks WHERE id = $1")
            .bind(track_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(track_id, "Track not found for deletion");
            return Err(AppError::NotFound("Track not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, dj))]
    async fn create_dj(&self, dj: &NewDj) -> Result<DjModel, AppError> {
        let created = sqlx::query_as::<_, DjModel>(&format!(
            "INSERT INTO djs (track_id, name, avatar, score, ranking) VALUES ($1, $2, $3, 0, 0) RETURNING {}",
            DJ_COLUMNS
        ))
        .bind(dj.track_id)
        .bind(&dj.name)
        .bind(&dj.avatar)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("DJ name '{}' is already taken", dj.name))
            } else if has_sqlstate(&e, FOREIGN_KEY_VIOLATION) {
                AppError::NotFound("Track not found".to_string())
            } else {
                AppError::DatabaseError(e.to_string())
            }
        })?;

        self.touch_track(dj.track_id).await?;
        Ok(created)
    }

    async fn get_dj(&self, dj_id: i64) -> Result<Option<DjModel>, AppError> {
        let dj = sqlx::query_as::<_, DjModel>(&format!(
            "SELECT {} FROM djs WHERE id = $1 AND left_at IS NULL",
            DJ_COLUMNS
        ))
        .bind(dj_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dj)
    }

    #[instrument(skip(self))]
    async fn update_dj_profile(
        &self,
        dj_id: i64,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<DjModel, AppError> {
        let updated = sqlx::query_as::<_, DjModel>(&format!(
            "UPDATE djs SET name = COALESCE($2, name), avatar = COALESCE($3, avatar) \
             WHERE id = $1 AND left_at IS NULL RETURNING {}",
            DJ_COLUMNS
        ))
        .bind(dj_id)
        .bind(name)
        .bind(avatar)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("DJ name is already taken".to_string())
            } else {
                AppError::DatabaseError(e.to_string())
            }
        })?
        .ok_or_else(|| AppError::NotFound("DJ not found".to_string()))?;

        self.touch_track(updated.track_id).await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn mark_dj_left(&self, dj_id: i64) -> Result<(), AppError> {
        // Songs and votes keep pointing at the row
        let row = sqlx::query(
            "UPDATE djs SET left_at = NOW(), ranking = 0 WHERE id = $1 AND left_at IS NULL RETURNING track_id",
        )
        .bind(dj_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("DJ not found".to_string()))?;

        let track_id: i64 = row.try_get("track_id")?;
        self.touch_track(track_id).await
    }

    async fn find_all_djs(&self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        let djs = sqlx::query_as::<_, DjModel>(&format!(
            "SELECT {} FROM djs WHERE track_id = $1 AND left_at IS NULL ORDER BY id",
            DJ_COLUMNS
        ))
        .bind(track_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(djs)
    }

    #[instrument(skip(self, song))]
    async fn create_song(&self, song: &NewSong) -> Result<SongModel, AppError> {
        let created = sqlx::query_as::<_, SongModel>(&format!(
            "INSERT INTO songs (track_id, dj_id, uri, name, artist, cover, points_applied) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE) RETURNING {}",
            SONG_COLUMNS
        ))
        .bind(song.track_id)
        .bind(song.dj_id)
        .bind(&song.uri)
        .bind(&song.name)
        .bind(&song.artist)
        .bind(&song.cover)
        .fetch_one(&self.pool)
        .await?;

        self.touch_track(song.track_id).await?;
        Ok(created)
    }

    async fn find_unscored_song(&self, track_id: i64) -> Result<Option<SongModel>, AppError> {
        let song = sqlx::query_as::<_, SongModel>(&format!(
            "SELECT {} FROM songs WHERE track_id = $1 AND points_applied = FALSE ORDER BY id LIMIT 1",
            SONG_COLUMNS
        ))
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(song)
    }

    async fn find_votes_for_song(&self, song_id: i64) -> Result<Vec<VoteModel>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM votes WHERE song_id = $1 ORDER BY id",
            VOTE_COLUMNS
        ))
        .bind(song_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn find_songs_by_dj(&self, dj_id: i64) -> Result<Vec<SongWithVotes>, AppError> {
        let songs = sqlx::query_as::<_, SongModel>(&format!(
            "SELECT {} FROM songs WHERE dj_id = $1 ORDER BY id",
            SONG_COLUMNS
        ))
        .bind(dj_id)
        .fetch_all(&self.pool)
        .await?;

        let vote_rows = sqlx::query(&format!(
            "SELECT {} FROM votes WHERE song_id IN (SELECT id FROM songs WHERE dj_id = $1) ORDER BY id",
            VOTE_COLUMNS
        ))
        .bind(dj_id)
        .fetch_all(&self.pool)
        .await?;

        let votes = vote_rows
            .iter()
            .map(vote_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(group_votes(songs, votes))
    }

    #[instrument(skip(self, vote))]
    async fn insert_vote(&self, vote: &NewVote) -> Result<VoteModel, AppError> {
        // FOR SHARE waits on a scoring run holding the song row, then sees its outcome
        let row = sqlx::query(&format!(
            "INSERT INTO votes (track_id, dj_id, song_id, category) \
             SELECT $1, $2, $3, $4 \
             WHERE EXISTS (SELECT 1 FROM songs WHERE id = $3 AND points_applied = FALSE FOR SHARE) \
             RETURNING {}",
            VOTE_COLUMNS
        ))
        .bind(vote.track_id)
        .bind(vote.dj_id)
        .bind(vote.song_id)
        .bind(vote.category.as_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Vote already cast".to_string())
            } else {
                AppError::DatabaseError(e.to_string())
            }
        })?
        .ok_or_else(|| AppError::NotFound("Song is no longer being judged".to_string()))?;

        let created = vote_from_row(&row)?;
        self.touch_track(vote.track_id).await?;
        Ok(created)
    }

    async fn begin(&self) -> Result<Box<dyn TrackTransaction>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

/// A scoring transaction on one pooled connection
///
/// Dropping it without commit lets sqlx roll back when the connection returns
/// to the pool.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TrackTransaction for PostgresTransaction {
    async fn get_song(&mut self, song_id: i64) -> Result<Option<SongModel>, AppError> {
        // Row lock keeps a concurrent pipeline from scoring the same song
        let song = sqlx::query_as::<_, SongModel>(&format!(
            "SELECT {} FROM songs WHERE id = $1 FOR UPDATE",
            SONG_COLUMNS
        ))
        .bind(song_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(song)
    }

    async fn find_all_songs_with_votes(
        &mut self,
        track_id: i64,
    ) -> Result<Vec<SongWithVotes>, AppError> {
        let songs = sqlx::query_as::<_, SongModel>(&format!(
            "SELECT {} FROM songs WHERE track_id = $1 ORDER BY id",
            SONG_COLUMNS
        ))
        .bind(track_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let vote_rows = sqlx::query(&format!(
            "SELECT {} FROM votes WHERE track_id = $1 ORDER BY id",
            VOTE_COLUMNS
        ))
        .bind(track_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let votes = vote_rows
            .iter()
            .map(vote_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(group_votes(songs, votes))
    }

    async fn find_all_djs(&mut self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        let djs = sqlx::query_as::<_, DjModel>(&format!(
            "SELECT {} FROM djs WHERE track_id = $1 AND left_at IS NULL ORDER BY id",
            DJ_COLUMNS
        ))
        .bind(track_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(djs)
    }

    async fn update_dj_score(&mut self, dj_id: i64, score: f64) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE djs SET score = $2 WHERE id = $1 AND left_at IS NULL")
            .bind(dj_id)
            .bind(score)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_dj_ranking(&mut self, dj_id: i64, ranking: i32) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE djs SET ranking = $2 WHERE id = $1 AND left_at IS NULL")
            .bind(dj_id)
            .bind(ranking)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn mark_song_scored(&mut self, song_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE songs SET points_applied = TRUE WHERE id = $1 AND points_applied = FALSE",
        )
        .bind(song_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn touch_track(&mut self, track_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE tracks SET updated_at = NOW() WHERE id = $1")
            .bind(track_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
