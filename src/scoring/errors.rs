use std::fmt;

use thiserror::Error;

use crate::shared::AppError;

/// Step of the scoring pipeline that was running when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Begin,
    LoadVotes,
    ApplyScores,
    RecomputeRankings,
    MarkScored,
    Commit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Begin => "begin",
            PipelineStage::LoadVotes => "load_votes",
            PipelineStage::ApplyScores => "apply_scores",
            PipelineStage::RecomputeRankings => "recompute_rankings",
            PipelineStage::MarkScored => "mark_scored",
            PipelineStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Repository error during {stage}: {source}")]
    Repository {
        stage: PipelineStage,
        #[source]
        source: AppError,
    },

    #[error("No rows affected during {stage} for {entity} {id}")]
    ZeroRowsAffected {
        stage: PipelineStage,
        entity: &'static str,
        id: i64,
    },

    #[error("Song {song_id} not found in track {track_id}")]
    SongNotFound { track_id: i64, song_id: i64 },
}

impl ScoringError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            ScoringError::Repository { stage, .. } => *stage,
            ScoringError::ZeroRowsAffected { stage, .. } => *stage,
            ScoringError::SongNotFound { .. } => PipelineStage::LoadVotes,
        }
    }
}

/// Attaches the pipeline stage to repository failures
pub(crate) trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> Result<T, ScoringError>;
}

impl<T> AtStage<T> for Result<T, AppError> {
    fn at(self, stage: PipelineStage) -> Result<T, ScoringError> {
        self.map_err(|source| ScoringError::Repository { stage, source })
    }
}
