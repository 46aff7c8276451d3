//! Genome Quest game backend
//!
//! Players identify mutations in genetic sequences. Puzzles are grouped into
//! missions; each submission is scored against the puzzle's answer key and
//! rolls up into mission completion.
//!
//! ## Module Structure
//!
//! - `models`: Records and status lifecycles
//! - `scoring`: Set-based submission scoring and feedback
//! - `auth`: Credential validation, password hashing, tokens
//! - `config`: Service configuration
//! - `storage`: Data persistence (postgres, local sqlite)
//! - `api`: REST handlers
//! - `server`: Router assembly and startup

/// Records and status lifecycles
pub mod models;

/// Submission scoring
pub mod scoring;

/// Credentials and tokens
pub mod auth;

/// Service configuration
pub mod config;

/// Data persistence layer
pub mod storage;

/// REST API
pub mod api;

/// HTTP server
pub mod server;

pub use api::{ApiError, ApiState};
pub use config::{AuthConfig, DatabaseConfig, GameConfig, ServerConfig};
pub use models::{
    Mission, MissionStatus, MutationId, Player, Puzzle, PuzzleStatus, PuzzleSubmission,
};
pub use scoring::{evaluate, Evaluation, Feedback, ScoreBreakdown};
pub use server::{build_app, run_server};
pub use storage::{GameStorage, LocalStorage, PgStorage, StorageError};
