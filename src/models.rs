//! Game records: players, missions, puzzles and submissions.
//!
//! Status enums carry the lifecycle rules so handlers and storage backends
//! agree on which transitions are legal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a single answer unit inside a puzzle sequence.
pub type MutationId = i64;

// ============================================================================
// STATUS LIFECYCLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Pending => "pending",
            MissionStatus::InProgress => "in_progress",
            MissionStatus::Completed => "completed",
        }
    }

    /// Missions only move forward: pending -> in_progress -> completed.
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        matches!(
            (self, next),
            (MissionStatus::Pending, MissionStatus::InProgress)
                | (MissionStatus::InProgress, MissionStatus::Completed)
        )
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MissionStatus::Pending),
            "in_progress" => Ok(MissionStatus::InProgress),
            "completed" => Ok(MissionStatus::Completed),
            other => Err(format!("\"{}\" is not a valid mission status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleStatus {
    #[default]
    Pending,
    Completed,
}

impl PuzzleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PuzzleStatus::Pending => "pending",
            PuzzleStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, next: PuzzleStatus) -> bool {
        matches!((self, next), (PuzzleStatus::Pending, PuzzleStatus::Completed))
    }
}

impl fmt::Display for PuzzleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PuzzleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PuzzleStatus::Pending),
            "completed" => Ok(PuzzleStatus::Completed),
            other => Err(format!("\"{}\" is not a valid puzzle status", other)),
        }
    }
}

/// A mission is complete once every one of its puzzles has at least one
/// submission. Repeated submissions to the same puzzle count once.
pub fn mission_is_complete(total_puzzles: i64, submitted_puzzles: i64) -> bool {
    total_puzzles > 0 && submitted_puzzles == total_puzzles
}

// ============================================================================
// PLAYERS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

// ============================================================================
// MISSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mission {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: MissionStatus,
}

#[derive(Debug, Clone)]
pub struct NewMission {
    pub name: String,
    pub description: String,
    pub status: MissionStatus,
}

#[derive(Debug, Clone, Default)]
pub struct MissionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

// ============================================================================
// PUZZLES
// ============================================================================

/// `mutation_data` holds the answer key and is never serialized to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Puzzle {
    pub id: i64,
    #[serde(rename = "mission")]
    pub mission_id: i64,
    pub sequence_data: String,
    #[serde(skip_serializing)]
    pub mutation_data: Vec<MutationId>,
    pub status: PuzzleStatus,
    pub time_limit: i32,
}

#[derive(Debug, Clone)]
pub struct NewPuzzle {
    pub mission_id: i64,
    pub sequence_data: String,
    pub mutation_data: Vec<MutationId>,
    pub status: PuzzleStatus,
    pub time_limit: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PuzzleUpdate {
    pub sequence_data: Option<String>,
    pub mutation_data: Option<Vec<MutationId>>,
    pub time_limit: Option<i32>,
}

pub const DEFAULT_TIME_LIMIT_SECS: i32 = 120;

// ============================================================================
// SUBMISSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PuzzleSubmission {
    pub id: i64,
    #[serde(rename = "player")]
    pub player_id: Option<i64>,
    #[serde(rename = "mission")]
    pub mission_id: i64,
    #[serde(rename = "puzzle")]
    pub puzzle_id: i64,
    pub mutations_found: Vec<MutationId>,
    pub timestamp: DateTime<Utc>,
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub player_id: Option<i64>,
    pub mission_id: i64,
    pub puzzle_id: i64,
    pub mutations_found: Vec<MutationId>,
    pub score: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilter {
    pub mission: Option<i64>,
    pub puzzle: Option<i64>,
    pub player: Option<i64>,
}

/// Result of persisting a submission together with its side effects.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub submission: PuzzleSubmission,
    pub mission_status: MissionStatus,
}
