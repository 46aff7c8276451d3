//! PostgreSQL Storage for Server Mode
//!
//! Pooled access through deadpool. The schema is created on startup.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

use super::{GameStorage, Result, StorageError};
use crate::models::{
    mission_is_complete, Mission, MissionStatus, MissionUpdate, NewMission, NewPlayer, NewPuzzle,
    NewSubmission, Player, Puzzle, PuzzleStatus, PuzzleSubmission, PuzzleUpdate,
    RecordedSubmission, SubmissionFilter,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    key TEXT PRIMARY KEY,
    player_id BIGINT NOT NULL UNIQUE REFERENCES players(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS missions (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);

CREATE TABLE IF NOT EXISTS puzzles (
    id BIGSERIAL PRIMARY KEY,
    mission_id BIGINT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    sequence_data TEXT NOT NULL,
    mutation_data JSONB NOT NULL DEFAULT '[]'::jsonb,
    status TEXT NOT NULL DEFAULT 'pending',
    time_limit INTEGER NOT NULL DEFAULT 120
);

CREATE INDEX IF NOT EXISTS idx_puzzles_mission ON puzzles(mission_id);

-- Append-only: rows are never updated
CREATE TABLE IF NOT EXISTS puzzle_submissions (
    id BIGSERIAL PRIMARY KEY,
    player_id BIGINT REFERENCES players(id) ON DELETE CASCADE,
    mission_id BIGINT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    puzzle_id BIGINT NOT NULL REFERENCES puzzles(id) ON DELETE CASCADE,
    mutations_found JSONB NOT NULL DEFAULT '[]'::jsonb,
    score INTEGER NOT NULL DEFAULT 0,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_submissions_mission ON puzzle_submissions(mission_id);
CREATE INDEX IF NOT EXISTS idx_submissions_puzzle ON puzzle_submissions(puzzle_id);
CREATE INDEX IF NOT EXISTS idx_submissions_player ON puzzle_submissions(player_id);
"#;

const PLAYER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const MISSION_COLUMNS: &str = "id, name, description, status";
const PUZZLE_COLUMNS: &str = "id, mission_id, sequence_data, mutation_data, status, time_limit";
const SUBMISSION_COLUMNS: &str =
    "id, player_id, mission_id, puzzle_id, mutations_found, timestamp, score";

#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Create storage from a DATABASE_URL and run the schema migration
    pub async fn new(database_url: &str, pool_size: usize) -> Result<Self> {
        let mut config = Config::new();
        config.url = Some(database_url.to_string());
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        config.pool = Some(deadpool_postgres::PoolConfig::new(pool_size.max(1)));
        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        // Test connection
        let client = pool.get().await?;
        info!("Connected to PostgreSQL database");

        client.batch_execute(SCHEMA).await?;
        info!("Database schema initialized");

        Ok(Self { pool })
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(StorageError::InvalidData)
}

fn mutations_from(value: serde_json::Value) -> Result<Vec<i64>> {
    Ok(serde_json::from_value(value)?)
}

fn player_from_row(row: &Row) -> Player {
    Player {
        id: row.get(0),
        username: row.get(1),
        email: row.get(2),
        password_hash: row.get(3),
        created_at: row.get(4),
    }
}

fn mission_from_row(row: &Row) -> Result<Mission> {
    let status: String = row.get(3);
    Ok(Mission {
        id: row.get(0),
        name: row.get(1),
        description: row.get(2),
        status: parse_status(&status)?,
    })
}

fn puzzle_from_row(row: &Row) -> Result<Puzzle> {
    let status: String = row.get(4);
    Ok(Puzzle {
        id: row.get(0),
        mission_id: row.get(1),
        sequence_data: row.get(2),
        mutation_data: mutations_from(row.get(3))?,
        status: parse_status(&status)?,
        time_limit: row.get(5),
    })
}

fn submission_from_row(row: &Row) -> Result<PuzzleSubmission> {
    Ok(PuzzleSubmission {
        id: row.get(0),
        player_id: row.get(1),
        mission_id: row.get(2),
        puzzle_id: row.get(3),
        mutations_found: mutations_from(row.get(4))?,
        timestamp: row.get(5),
        score: row.get(6),
    })
}

fn conflict_or(err: tokio_postgres::Error, what: &str) -> StorageError {
    let constraint = err.code().is_some_and(|code| {
        *code == SqlState::UNIQUE_VIOLATION || *code == SqlState::FOREIGN_KEY_VIOLATION
    });
    if constraint {
        StorageError::Conflict(what.to_string())
    } else {
        err.into()
    }
}

// ============================================================================
// GAME STORAGE
// ============================================================================

#[async_trait]
impl GameStorage for PgStorage {
    // ========================================================================
    // PLAYERS
    // ========================================================================

    async fn create_player(&self, player: &NewPlayer) -> Result<Player> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO players (username, email, password_hash)
                     VALUES ($1, $2, $3) RETURNING {}",
                    PLAYER_COLUMNS
                ),
                &[&player.username, &player.email, &player.password_hash],
            )
            .await
            .map_err(|e| conflict_or(e, "username or email already exists"))?;

        let created = player_from_row(&row);
        debug!("Created player {} ({})", created.id, created.username);
        Ok(created)
    }

    async fn find_player_by_username(&self, username: &str) -> Result<Option<Player>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM players WHERE username = $1", PLAYER_COLUMNS),
                &[&username],
            )
            .await?;
        Ok(row.as_ref().map(player_from_row))
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM players WHERE username = $1)",
                &[&username],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM players WHERE email = $1)",
                &[&email],
            )
            .await?;
        Ok(row.get(0))
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    async fn get_or_create_token(&self, player_id: i64, candidate: &str) -> Result<String> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO auth_tokens (key, player_id) VALUES ($1, $2)
                 ON CONFLICT (player_id) DO NOTHING",
                &[&candidate, &player_id],
            )
            .await?;
        let row = client
            .query_one(
                "SELECT key FROM auth_tokens WHERE player_id = $1",
                &[&player_id],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn player_for_token(&self, token: &str) -> Result<Option<Player>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT p.id, p.username, p.email, p.password_hash, p.created_at
                 FROM auth_tokens t JOIN players p ON p.id = t.player_id
                 WHERE t.key = $1",
                &[&token],
            )
            .await?;
        Ok(row.as_ref().map(player_from_row))
    }

    // ========================================================================
    // MISSIONS
    // ========================================================================

    async fn create_mission(&self, mission: &NewMission) -> Result<Mission> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO missions (name, description, status)
                     VALUES ($1, $2, $3) RETURNING {}",
                    MISSION_COLUMNS
                ),
                &[&mission.name, &mission.description, &mission.status.as_str()],
            )
            .await?;
        mission_from_row(&row)
    }

    async fn get_mission(&self, id: i64) -> Result<Option<Mission>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM missions WHERE id = $1", MISSION_COLUMNS),
                &[&id],
            )
            .await?;
        row.as_ref().map(mission_from_row).transpose()
    }

    async fn list_missions(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>> {
        let client = self.pool.get().await?;
        let status = status.map(|s| s.as_str());
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM missions
                     WHERE ($1::TEXT IS NULL OR status = $1)
                     ORDER BY id ASC",
                    MISSION_COLUMNS
                ),
                &[&status],
            )
            .await?;
        rows.iter().map(mission_from_row).collect()
    }

    async fn update_mission(&self, id: i64, update: &MissionUpdate) -> Result<Option<Mission>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE missions SET name = COALESCE($2, name),
                                         description = COALESCE($3, description)
                     WHERE id = $1 RETURNING {}",
                    MISSION_COLUMNS
                ),
                &[&id, &update.name, &update.description],
            )
            .await?;
        row.as_ref().map(mission_from_row).transpose()
    }

    async fn delete_mission(&self, id: i64) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute("DELETE FROM missions WHERE id = $1", &[&id])
            .await?;
        Ok(affected > 0)
    }

    async fn transition_mission(
        &self,
        id: i64,
        from: MissionStatus,
        to: MissionStatus,
    ) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "UPDATE missions SET status = $3 WHERE id = $1 AND status = $2",
                &[&id, &from.as_str(), &to.as_str()],
            )
            .await?;
        Ok(affected > 0)
    }

    // ========================================================================
    // PUZZLES
    // ========================================================================

    async fn create_puzzle(&self, puzzle: &NewPuzzle) -> Result<Puzzle> {
        let client = self.pool.get().await?;
        let mutation_data = serde_json::to_value(&puzzle.mutation_data)?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO puzzles (mission_id, sequence_data, mutation_data, status, time_limit)
                     VALUES ($1, $2, $3, $4, $5) RETURNING {}",
                    PUZZLE_COLUMNS
                ),
                &[
                    &puzzle.mission_id,
                    &puzzle.sequence_data,
                    &mutation_data,
                    &puzzle.status.as_str(),
                    &puzzle.time_limit,
                ],
            )
            .await
            .map_err(|e| conflict_or(e, "mission does not exist"))?;
        puzzle_from_row(&row)
    }

    async fn get_puzzle(&self, id: i64) -> Result<Option<Puzzle>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM puzzles WHERE id = $1", PUZZLE_COLUMNS),
                &[&id],
            )
            .await?;
        row.as_ref().map(puzzle_from_row).transpose()
    }

    async fn list_puzzles(&self, mission_id: i64) -> Result<Vec<Puzzle>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM puzzles WHERE mission_id = $1 ORDER BY id ASC",
                    PUZZLE_COLUMNS
                ),
                &[&mission_id],
            )
            .await?;
        rows.iter().map(puzzle_from_row).collect()
    }

    async fn update_puzzle(&self, id: i64, update: &PuzzleUpdate) -> Result<Option<Puzzle>> {
        let client = self.pool.get().await?;
        let mutation_data = update
            .mutation_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE puzzles SET sequence_data = COALESCE($2, sequence_data),
                                        mutation_data = COALESCE($3, mutation_data),
                                        time_limit = COALESCE($4, time_limit)
                     WHERE id = $1 RETURNING {}",
                    PUZZLE_COLUMNS
                ),
                &[&id, &update.sequence_data, &mutation_data, &update.time_limit],
            )
            .await?;
        row.as_ref().map(puzzle_from_row).transpose()
    }

    async fn delete_puzzle(&self, id: i64) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute("DELETE FROM puzzles WHERE id = $1", &[&id])
            .await?;
        Ok(affected > 0)
    }

    // ========================================================================
    // SUBMISSIONS
    // ========================================================================

    async fn record_submission(&self, submission: &NewSubmission) -> Result<RecordedSubmission> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Lock the mission row so concurrent rollups serialize
        let status: String = tx
            .query_opt(
                "SELECT status FROM missions WHERE id = $1 FOR UPDATE",
                &[&submission.mission_id],
            )
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("mission {}", submission.mission_id)))?
            .get(0);
        let mut mission_status: MissionStatus = parse_status(&status)?;
        if mission_status != MissionStatus::InProgress {
            return Err(StorageError::InvalidState(
                "Mission is not in progress".to_string(),
            ));
        }

        let puzzle = tx
            .query_opt(
                "SELECT mission_id, status FROM puzzles WHERE id = $1 FOR UPDATE",
                &[&submission.puzzle_id],
            )
            .await?
            .ok_or_else(|| {
                StorageError::NotFound(format!("puzzle {}", submission.puzzle_id))
            })?;
        let puzzle_mission: i64 = puzzle.get(0);
        if puzzle_mission != submission.mission_id {
            return Err(StorageError::InvalidState(
                "Puzzle does not belong to mission".to_string(),
            ));
        }

        let puzzle_status: String = puzzle.get(1);
        let puzzle_status: PuzzleStatus = parse_status(&puzzle_status)?;
        if puzzle_status.can_transition_to(PuzzleStatus::Completed) {
            tx.execute(
                "UPDATE puzzles SET status = $2 WHERE id = $1",
                &[&submission.puzzle_id, &PuzzleStatus::Completed.as_str()],
            )
            .await?;
        }

        let mutations_found = serde_json::to_value(&submission.mutations_found)?;
        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO puzzle_submissions (player_id, mission_id, puzzle_id, mutations_found, score)
                     VALUES ($1, $2, $3, $4, $5) RETURNING {}",
                    SUBMISSION_COLUMNS
                ),
                &[
                    &submission.player_id,
                    &submission.mission_id,
                    &submission.puzzle_id,
                    &mutations_found,
                    &submission.score,
                ],
            )
            .await?;
        let stored = submission_from_row(&row)?;

        let counts = tx
            .query_one(
                "SELECT
                    (SELECT COUNT(*) FROM puzzles WHERE mission_id = $1),
                    (SELECT COUNT(DISTINCT puzzle_id) FROM puzzle_submissions WHERE mission_id = $1)",
                &[&submission.mission_id],
            )
            .await?;
        let total_puzzles: i64 = counts.get(0);
        let submitted_puzzles: i64 = counts.get(1);

        if mission_is_complete(total_puzzles, submitted_puzzles)
            && mission_status.can_transition_to(MissionStatus::Completed)
        {
            tx.execute(
                "UPDATE missions SET status = $2 WHERE id = $1",
                &[&submission.mission_id, &MissionStatus::Completed.as_str()],
            )
            .await?;
            mission_status = MissionStatus::Completed;
            info!("Mission {} completed", submission.mission_id);
        }

        tx.commit().await?;

        debug!(
            "Stored submission {} for puzzle {} (score {})",
            stored.id, stored.puzzle_id, stored.score
        );
        Ok(RecordedSubmission {
            submission: stored,
            mission_status,
        })
    }

    async fn get_submission(&self, id: i64) -> Result<Option<PuzzleSubmission>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM puzzle_submissions WHERE id = $1",
                    SUBMISSION_COLUMNS
                ),
                &[&id],
            )
            .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<PuzzleSubmission>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM puzzle_submissions
                     WHERE ($1::BIGINT IS NULL OR mission_id = $1)
                       AND ($2::BIGINT IS NULL OR puzzle_id = $2)
                       AND ($3::BIGINT IS NULL OR player_id = $3)
                     ORDER BY id ASC",
                    SUBMISSION_COLUMNS
                ),
                &[&filter.mission, &filter.puzzle, &filter.player],
            )
            .await?;
        rows.iter().map(submission_from_row).collect()
    }
}
