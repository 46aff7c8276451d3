//! Local SQLite Storage
//!
//! Single-file storage for running the game without a PostgreSQL server.
//! Also backs the test suite through [`LocalStorage::in_memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::{encode_mutations, GameStorage, Result, StorageError};
use crate::models::{
    mission_is_complete, Mission, MissionStatus, MissionUpdate, NewMission, NewPlayer, NewPuzzle,
    NewSubmission, Player, Puzzle, PuzzleStatus, PuzzleSubmission, PuzzleUpdate,
    RecordedSubmission, SubmissionFilter,
};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    key TEXT PRIMARY KEY,
    player_id INTEGER NOT NULL UNIQUE REFERENCES players(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);

CREATE TABLE IF NOT EXISTS puzzles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id INTEGER NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    sequence_data TEXT NOT NULL,
    mutation_data TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'pending',
    time_limit INTEGER NOT NULL DEFAULT 120
);

CREATE INDEX IF NOT EXISTS idx_puzzles_mission ON puzzles(mission_id);

CREATE TABLE IF NOT EXISTS puzzle_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id INTEGER REFERENCES players(id) ON DELETE CASCADE,
    mission_id INTEGER NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    puzzle_id INTEGER NOT NULL REFERENCES puzzles(id) ON DELETE CASCADE,
    mutations_found TEXT NOT NULL DEFAULT '[]',
    score INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_submissions_mission ON puzzle_submissions(mission_id);
CREATE INDEX IF NOT EXISTS idx_submissions_puzzle ON puzzle_submissions(puzzle_id);
"#;

const PLAYER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const PUZZLE_COLUMNS: &str = "id, mission_id, sequence_data, mutation_data, status, time_limit";
const SUBMISSION_COLUMNS: &str =
    "id, player_id, mission_id, puzzle_id, mutations_found, timestamp, score";

pub struct LocalStorage {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStorage {
    /// Create storage at the specified path
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("Local storage initialized at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut *conn)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    Ok(DateTime::from_timestamp_millis(millis).unwrap_or_default())
}

fn parsed_column<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn mutations_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<i64>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<Mission> {
    Ok(Mission {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: parsed_column(row, 3)?,
    })
}

fn puzzle_from_row(row: &Row<'_>) -> rusqlite::Result<Puzzle> {
    Ok(Puzzle {
        id: row.get(0)?,
        mission_id: row.get(1)?,
        sequence_data: row.get(2)?,
        mutation_data: mutations_column(row, 3)?,
        status: parsed_column(row, 4)?,
        time_limit: row.get(5)?,
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<PuzzleSubmission> {
    Ok(PuzzleSubmission {
        id: row.get(0)?,
        player_id: row.get(1)?,
        mission_id: row.get(2)?,
        puzzle_id: row.get(3)?,
        mutations_found: mutations_column(row, 4)?,
        timestamp: timestamp_column(row, 5)?,
        score: row.get(6)?,
    })
}

fn conflict_or(err: rusqlite::Error, what: &str) -> StorageError {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        StorageError::Conflict(what.to_string())
    } else {
        err.into()
    }
}

fn select_mission(conn: &Connection, id: i64) -> Result<Option<Mission>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description, status FROM missions WHERE id = ?1",
            params![id],
            mission_from_row,
        )
        .optional()?)
}

fn select_puzzle(conn: &Connection, id: i64) -> Result<Option<Puzzle>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM puzzles WHERE id = ?1", PUZZLE_COLUMNS),
            params![id],
            puzzle_from_row,
        )
        .optional()?)
}

// ============================================================================
// GAME STORAGE
// ============================================================================

#[async_trait]
impl GameStorage for LocalStorage {
    async fn create_player(&self, player: &NewPlayer) -> Result<Player> {
        self.with_conn(|conn| {
            let created_at = now_millis();
            conn.execute(
                "INSERT INTO players (username, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![player.username, player.email, player.password_hash, created_at],
            )
            .map_err(|e| conflict_or(e, "username or email already exists"))?;
            let id = conn.last_insert_rowid();
            debug!("Created player {} ({})", id, player.username);

            Ok(Player {
                id,
                username: player.username.clone(),
                email: player.email.clone(),
                password_hash: player.password_hash.clone(),
                created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
            })
        })
    }

    async fn find_player_by_username(&self, username: &str) -> Result<Option<Player>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM players WHERE username = ?1", PLAYER_COLUMNS),
                    params![username],
                    player_from_row,
                )
                .optional()?)
        })
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM players WHERE username = ?1)",
                params![username],
                |row| row.get(0),
            )?)
        })
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM players WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )?)
        })
    }

    async fn get_or_create_token(&self, player_id: i64, candidate: &str) -> Result<String> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_tokens (key, player_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(player_id) DO NOTHING",
                params![candidate, player_id, now_millis()],
            )?;
            Ok(conn.query_row(
                "SELECT key FROM auth_tokens WHERE player_id = ?1",
                params![player_id],
                |row| row.get(0),
            )?)
        })
    }

    async fn player_for_token(&self, token: &str) -> Result<Option<Player>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT p.id, p.username, p.email, p.password_hash, p.created_at
                     FROM auth_tokens t JOIN players p ON p.id = t.player_id
                     WHERE t.key = ?1",
                    params![token],
                    player_from_row,
                )
                .optional()?)
        })
    }

    async fn create_mission(&self, mission: &NewMission) -> Result<Mission> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO missions (name, description, status) VALUES (?1, ?2, ?3)",
                params![mission.name, mission.description, mission.status.as_str()],
            )?;
            Ok(Mission {
                id: conn.last_insert_rowid(),
                name: mission.name.clone(),
                description: mission.description.clone(),
                status: mission.status,
            })
        })
    }

    async fn get_mission(&self, id: i64) -> Result<Option<Mission>> {
        self.with_conn(|conn| select_mission(conn, id))
    }

    async fn list_missions(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, status FROM missions
                 WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC",
            )?;
            let missions = stmt
                .query_map(params![status.map(|s| s.as_str())], mission_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(missions)
        })
    }

    async fn update_mission(&self, id: i64, update: &MissionUpdate) -> Result<Option<Mission>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE missions SET name = COALESCE(?2, name),
                                     description = COALESCE(?3, description)
                 WHERE id = ?1",
                params![id, update.name, update.description],
            )?;
            select_mission(conn, id)
        })
    }

    async fn delete_mission(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM missions WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    async fn transition_mission(
        &self,
        id: i64,
        from: MissionStatus,
        to: MissionStatus,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE missions SET status = ?3 WHERE id = ?1 AND status = ?2",
                params![id, from.as_str(), to.as_str()],
            )?;
            Ok(affected > 0)
        })
    }

    async fn create_puzzle(&self, puzzle: &NewPuzzle) -> Result<Puzzle> {
        let mutation_data = encode_mutations(&puzzle.mutation_data)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO puzzles (mission_id, sequence_data, mutation_data, status, time_limit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    puzzle.mission_id,
                    puzzle.sequence_data,
                    mutation_data,
                    puzzle.status.as_str(),
                    puzzle.time_limit
                ],
            )
            .map_err(|e| conflict_or(e, "mission does not exist"))?;
            Ok(Puzzle {
                id: conn.last_insert_rowid(),
                mission_id: puzzle.mission_id,
                sequence_data: puzzle.sequence_data.clone(),
                mutation_data: puzzle.mutation_data.clone(),
                status: puzzle.status,
                time_limit: puzzle.time_limit,
            })
        })
    }

    async fn get_puzzle(&self, id: i64) -> Result<Option<Puzzle>> {
        self.with_conn(|conn| select_puzzle(conn, id))
    }

    async fn list_puzzles(&self, mission_id: i64) -> Result<Vec<Puzzle>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM puzzles WHERE mission_id = ?1 ORDER BY id ASC",
                PUZZLE_COLUMNS
            ))?;
            let puzzles = stmt
                .query_map(params![mission_id], puzzle_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(puzzles)
        })
    }

    async fn update_puzzle(&self, id: i64, update: &PuzzleUpdate) -> Result<Option<Puzzle>> {
        let mutation_data = update
            .mutation_data
            .as_deref()
            .map(encode_mutations)
            .transpose()?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE puzzles SET sequence_data = COALESCE(?2, sequence_data),
                                    mutation_data = COALESCE(?3, mutation_data),
                                    time_limit = COALESCE(?4, time_limit)
                 WHERE id = ?1",
                params![id, update.sequence_data, mutation_data, update.time_limit],
            )?;
            select_puzzle(conn, id)
        })
    }

    async fn delete_puzzle(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM puzzles WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    async fn record_submission(&self, submission: &NewSubmission) -> Result<RecordedSubmission> {
        let mutations_found = encode_mutations(&submission.mutations_found)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let status: String = tx
                .query_row(
                    "SELECT status FROM missions WHERE id = ?1",
                    params![submission.mission_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| {
                    StorageError::NotFound(format!("mission {}", submission.mission_id))
                })?;
            let mut mission_status =
                MissionStatus::from_str(&status).map_err(StorageError::InvalidData)?;
            if mission_status != MissionStatus::InProgress {
                return Err(StorageError::InvalidState(
                    "Mission is not in progress".to_string(),
                ));
            }

            let (puzzle_mission, puzzle_status): (i64, String) = tx
                .query_row(
                    "SELECT mission_id, status FROM puzzles WHERE id = ?1",
                    params![submission.puzzle_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| {
                    StorageError::NotFound(format!("puzzle {}", submission.puzzle_id))
                })?;
            if puzzle_mission != submission.mission_id {
                return Err(StorageError::InvalidState(
                    "Puzzle does not belong to mission".to_string(),
                ));
            }

            let puzzle_status =
                PuzzleStatus::from_str(&puzzle_status).map_err(StorageError::InvalidData)?;
            if puzzle_status.can_transition_to(PuzzleStatus::Completed) {
                tx.execute(
                    "UPDATE puzzles SET status = ?2 WHERE id = ?1",
                    params![submission.puzzle_id, PuzzleStatus::Completed.as_str()],
                )?;
            }

            let timestamp = now_millis();
            tx.execute(
                "INSERT INTO puzzle_submissions
                    (player_id, mission_id, puzzle_id, mutations_found, score, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    submission.player_id,
                    submission.mission_id,
                    submission.puzzle_id,
                    mutations_found,
                    submission.score,
                    timestamp
                ],
            )?;
            let id = tx.last_insert_rowid();

            let total_puzzles: i64 = tx.query_row(
                "SELECT COUNT(*) FROM puzzles WHERE mission_id = ?1",
                params![submission.mission_id],
                |row| row.get(0),
            )?;
            let submitted_puzzles: i64 = tx.query_row(
                "SELECT COUNT(DISTINCT puzzle_id) FROM puzzle_submissions WHERE mission_id = ?1",
                params![submission.mission_id],
                |row| row.get(0),
            )?;

            if mission_is_complete(total_puzzles, submitted_puzzles)
                && mission_status.can_transition_to(MissionStatus::Completed)
            {
                tx.execute(
                    "UPDATE missions SET status = ?2 WHERE id = ?1",
                    params![submission.mission_id, MissionStatus::Completed.as_str()],
                )?;
                mission_status = MissionStatus::Completed;
                info!("Mission {} completed", submission.mission_id);
            }

            tx.commit()?;

            Ok(RecordedSubmission {
                submission: PuzzleSubmission {
                    id,
                    player_id: submission.player_id,
                    mission_id: submission.mission_id,
                    puzzle_id: submission.puzzle_id,
                    mutations_found: submission.mutations_found.clone(),
                    timestamp: DateTime::from_timestamp_millis(timestamp).unwrap_or_default(),
                    score: submission.score,
                },
                mission_status,
            })
        })
    }

    async fn get_submission(&self, id: i64) -> Result<Option<PuzzleSubmission>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM puzzle_submissions WHERE id = ?1",
                        SUBMISSION_COLUMNS
                    ),
                    params![id],
                    submission_from_row,
                )
                .optional()?)
        })
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<PuzzleSubmission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM puzzle_submissions
                 WHERE (?1 IS NULL OR mission_id = ?1)
                   AND (?2 IS NULL OR puzzle_id = ?2)
                   AND (?3 IS NULL OR player_id = ?3)
                 ORDER BY id ASC",
                SUBMISSION_COLUMNS
            ))?;
            let submissions = stmt
                .query_map(
                    params![filter.mission, filter.puzzle, filter.player],
                    submission_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(submissions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_TIME_LIMIT_SECS;

    async fn mission_with_puzzles(
        storage: &LocalStorage,
        answer_keys: &[&[i64]],
    ) -> (Mission, Vec<Puzzle>) {
        let mission = storage
            .create_mission(&NewMission {
                name: "Exon hunt".to_string(),
                description: "Find the point mutations".to_string(),
                status: MissionStatus::InProgress,
            })
            .await
            .unwrap();

        let mut puzzles = Vec::new();
        for key in answer_keys {
            let puzzle = storage
                .create_puzzle(&NewPuzzle {
                    mission_id: mission.id,
                    sequence_data: "ACGTACGT".to_string(),
                    mutation_data: key.to_vec(),
                    status: PuzzleStatus::Pending,
                    time_limit: DEFAULT_TIME_LIMIT_SECS,
                })
                .await
                .unwrap();
            puzzles.push(puzzle);
        }
        (mission, puzzles)
    }

    fn submission(mission: &Mission, puzzle: &Puzzle, found: &[i64]) -> NewSubmission {
        NewSubmission {
            player_id: None,
            mission_id: mission.id,
            puzzle_id: puzzle.id,
            mutations_found: found.to_vec(),
            score: 0,
        }
    }

    #[tokio::test]
    async fn test_players_and_tokens() {
        let storage = LocalStorage::in_memory().unwrap();

        let player = storage
            .create_player(&NewPlayer {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "sha256$1$00$00".to_string(),
            })
            .await
            .unwrap();

        assert!(storage.username_exists("ada").await.unwrap());
        assert!(storage.email_exists("ada@example.com").await.unwrap());
        assert!(!storage.username_exists("grace").await.unwrap());

        let duplicate = storage
            .create_player(&NewPlayer {
                username: "ada".to_string(),
                email: "other@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .await;
        assert!(matches!(duplicate, Err(StorageError::Conflict(_))));

        let token = storage.get_or_create_token(player.id, "first").await.unwrap();
        assert_eq!(token, "first");
        let again = storage.get_or_create_token(player.id, "second").await.unwrap();
        assert_eq!(again, "first");

        let owner = storage.player_for_token("first").await.unwrap().unwrap();
        assert_eq!(owner.id, player.id);
        assert!(storage.player_for_token("second").await.unwrap().is_none());

        let found = storage.find_player_by_username("ada").await.unwrap().unwrap();
        assert_eq!(found.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_mission_transition_is_conditional() {
        let storage = LocalStorage::in_memory().unwrap();
        let mission = storage
            .create_mission(&NewMission {
                name: "Intron sweep".to_string(),
                description: String::new(),
                status: MissionStatus::Pending,
            })
            .await
            .unwrap();

        assert!(storage
            .transition_mission(mission.id, MissionStatus::Pending, MissionStatus::InProgress)
            .await
            .unwrap());
        assert!(!storage
            .transition_mission(mission.id, MissionStatus::Pending, MissionStatus::InProgress)
            .await
            .unwrap());

        let reloaded = storage.get_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MissionStatus::InProgress);

        let in_progress = storage
            .list_missions(Some(MissionStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert!(storage
            .list_missions(Some(MissionStatus::Pending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_updates_and_cascading_delete() {
        let storage = LocalStorage::in_memory().unwrap();
        let (mission, puzzles) = mission_with_puzzles(&storage, &[&[1, 2]]).await;

        let updated = storage
            .update_mission(
                mission.id,
                &MissionUpdate {
                    name: Some("Renamed".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.description, mission.description);

        let puzzle = storage
            .update_puzzle(
                puzzles[0].id,
                &PuzzleUpdate {
                    mutation_data: Some(vec![9]),
                    time_limit: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(puzzle.mutation_data, vec![9]);
        assert_eq!(puzzle.time_limit, 30);
        assert_eq!(puzzle.sequence_data, "ACGTACGT");

        storage
            .record_submission(&submission(&mission, &puzzles[0], &[9]))
            .await
            .unwrap();

        assert!(storage.delete_mission(mission.id).await.unwrap());
        assert!(!storage.delete_mission(mission.id).await.unwrap());
        assert!(storage.get_puzzle(puzzles[0].id).await.unwrap().is_none());
        assert!(storage
            .list_submissions(&SubmissionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_submission_completes_puzzle_and_mission() {
        let storage = LocalStorage::in_memory().unwrap();
        let (mission, puzzles) = mission_with_puzzles(&storage, &[&[1, 2], &[3]]).await;

        let first = storage
            .record_submission(&submission(&mission, &puzzles[0], &[1]))
            .await
            .unwrap();
        assert_eq!(first.mission_status, MissionStatus::InProgress);
        assert_eq!(
            storage.get_puzzle(puzzles[0].id).await.unwrap().unwrap().status,
            PuzzleStatus::Completed
        );
        assert_eq!(
            storage.get_puzzle(puzzles[1].id).await.unwrap().unwrap().status,
            PuzzleStatus::Pending
        );

        let second = storage
            .record_submission(&submission(&mission, &puzzles[1], &[]))
            .await
            .unwrap();
        assert_eq!(second.mission_status, MissionStatus::Completed);
        assert_eq!(
            storage.get_mission(mission.id).await.unwrap().unwrap().status,
            MissionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_repeated_submissions_do_not_complete_mission() {
        let storage = LocalStorage::in_memory().unwrap();
        let (mission, puzzles) = mission_with_puzzles(&storage, &[&[1], &[2]]).await;

        for _ in 0..3 {
            let recorded = storage
                .record_submission(&submission(&mission, &puzzles[0], &[1]))
                .await
                .unwrap();
            assert_eq!(recorded.mission_status, MissionStatus::InProgress);
        }

        let all = storage
            .list_submissions(&SubmissionFilter {
                puzzle: Some(puzzles[0].id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(
            storage.get_mission(mission.id).await.unwrap().unwrap().status,
            MissionStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_submission_rejected_unless_in_progress() {
        let storage = LocalStorage::in_memory().unwrap();
        let (mission, puzzles) = mission_with_puzzles(&storage, &[&[1], &[2]]).await;

        let pending = storage
            .create_mission(&NewMission {
                name: "Not yet".to_string(),
                description: String::new(),
                status: MissionStatus::Pending,
            })
            .await
            .unwrap();
        let mut early = submission(&mission, &puzzles[0], &[1]);
        early.mission_id = pending.id;
        let result = storage.record_submission(&early).await;
        assert!(matches!(result, Err(StorageError::InvalidState(_))));

        // Completed missions accept nothing further
        storage
            .record_submission(&submission(&mission, &puzzles[0], &[1]))
            .await
            .unwrap();
        let last = storage
            .record_submission(&submission(&mission, &puzzles[1], &[2]))
            .await
            .unwrap();
        assert_eq!(last.mission_status, MissionStatus::Completed);

        let late = storage
            .record_submission(&submission(&mission, &puzzles[1], &[2]))
            .await;
        assert!(matches!(late, Err(StorageError::InvalidState(_))));
        assert_eq!(
            storage
                .list_submissions(&SubmissionFilter {
                    mission: Some(mission.id),
                    ..Default::default()
                })
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_submission_puzzle_must_belong_to_mission() {
        let storage = LocalStorage::in_memory().unwrap();
        let (home, _) = mission_with_puzzles(&storage, &[&[1]]).await;
        let (_, away_puzzles) = mission_with_puzzles(&storage, &[&[2]]).await;

        let result = storage
            .record_submission(&submission(&home, &away_puzzles[0], &[2]))
            .await;
        match result {
            Err(StorageError::InvalidState(msg)) => {
                assert_eq!(msg, "Puzzle does not belong to mission")
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }

        // Nothing was written for the foreign puzzle
        assert_eq!(
            storage
                .get_puzzle(away_puzzles[0].id)
                .await
                .unwrap()
                .unwrap()
                .status,
            PuzzleStatus::Pending
        );
        assert!(storage
            .list_submissions(&SubmissionFilter::default())
            .await
            .unwrap()
            .is_empty());

        let mut unknown = submission(&home, &away_puzzles[0], &[]);
        unknown.puzzle_id = 999;
        let result = storage.record_submission(&unknown).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_submission_for_unknown_mission() {
        let storage = LocalStorage::in_memory().unwrap();
        let result = storage
            .record_submission(&NewSubmission {
                player_id: None,
                mission_id: 404,
                puzzle_id: 1,
                mutations_found: vec![],
                score: 0,
            })
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_on_disk_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quest.db");

        {
            let storage = LocalStorage::new(&path).unwrap();
            mission_with_puzzles(&storage, &[&[5, 6]]).await;
        }

        let storage = LocalStorage::new(&path).unwrap();
        let missions = storage.list_missions(None).await.unwrap();
        assert_eq!(missions.len(), 1);
        let puzzles = storage.list_puzzles(missions[0].id).await.unwrap();
        assert_eq!(puzzles[0].mutation_data, vec![5, 6]);
    }
}
