//! Data persistence layer.
//!
//! `GameStorage` is the seam between HTTP handlers and the database. Two
//! backends implement it:
//! - [`pg::PgStorage`]: PostgreSQL, used in server mode
//! - [`local::LocalStorage`]: SQLite, used locally and in tests

pub mod local;
pub mod pg;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::models::{
    Mission, MissionStatus, MissionUpdate, NewMission, NewPlayer, NewPuzzle, NewSubmission,
    Player, Puzzle, PuzzleSubmission, PuzzleUpdate, RecordedSubmission, SubmissionFilter,
};

pub use local::LocalStorage;
pub use pg::PgStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The operation is not allowed in the record's current state
    #[error("{0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait GameStorage: Send + Sync {
    // ==================== Players ====================

    /// Insert a player. Duplicate username or email yields `Conflict`.
    async fn create_player(&self, player: &NewPlayer) -> Result<Player>;
    async fn find_player_by_username(&self, username: &str) -> Result<Option<Player>>;
    async fn username_exists(&self, username: &str) -> Result<bool>;
    async fn email_exists(&self, email: &str) -> Result<bool>;

    // ==================== Tokens ====================

    /// Return the player's token, storing `candidate` if none exists yet.
    async fn get_or_create_token(&self, player_id: i64, candidate: &str) -> Result<String>;
    async fn player_for_token(&self, token: &str) -> Result<Option<Player>>;

    // ==================== Missions ====================

    async fn create_mission(&self, mission: &NewMission) -> Result<Mission>;
    async fn get_mission(&self, id: i64) -> Result<Option<Mission>>;
    async fn list_missions(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>>;
    async fn update_mission(&self, id: i64, update: &MissionUpdate) -> Result<Option<Mission>>;
    async fn delete_mission(&self, id: i64) -> Result<bool>;

    /// Move a mission from `from` to `to` only if it is currently in `from`.
    /// Returns false when the mission was not in the expected state.
    async fn transition_mission(
        &self,
        id: i64,
        from: MissionStatus,
        to: MissionStatus,
    ) -> Result<bool>;

    // ==================== Puzzles ====================

    async fn create_puzzle(&self, puzzle: &NewPuzzle) -> Result<Puzzle>;
    async fn get_puzzle(&self, id: i64) -> Result<Option<Puzzle>>;
    async fn list_puzzles(&self, mission_id: i64) -> Result<Vec<Puzzle>>;
    async fn update_puzzle(&self, id: i64, update: &PuzzleUpdate) -> Result<Option<Puzzle>>;
    async fn delete_puzzle(&self, id: i64) -> Result<bool>;

    // ==================== Submissions ====================

    /// Persist a scored submission and apply its side effects atomically:
    /// the puzzle is completed, and the mission is completed once every
    /// puzzle in it has a submission.
    ///
    /// Fails with `InvalidState` unless the mission is in progress and owns
    /// the puzzle.
    async fn record_submission(&self, submission: &NewSubmission) -> Result<RecordedSubmission>;
    async fn get_submission(&self, id: i64) -> Result<Option<PuzzleSubmission>>;
    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<PuzzleSubmission>>;
}

/// Open the configured backend: PostgreSQL when a URL is set, SQLite otherwise.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn GameStorage>> {
    match &config.url {
        Some(url) => {
            let storage = PgStorage::new(url, config.pool_size).await?;
            Ok(Arc::new(storage))
        }
        None => {
            info!("DATABASE_URL not set, using SQLite storage");
            let storage = LocalStorage::new(&config.sqlite_path)?;
            Ok(Arc::new(storage))
        }
    }
}

pub(crate) fn encode_mutations(mutations: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(mutations)?)
}
