//! Puzzle endpoints. `mutation_data` is accepted on write and never returned.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiState, MutationList};
use crate::models::{NewPuzzle, Puzzle, PuzzleStatus, PuzzleUpdate, DEFAULT_TIME_LIMIT_SECS};

fn validate_time_limit(time_limit: i32) -> Result<(), ApiError> {
    if time_limit <= 0 {
        return Err(ApiError::bad_request(
            "time_limit must be a positive number of seconds.",
        ));
    }
    Ok(())
}

fn validate_sequence(sequence_data: &str) -> Result<(), ApiError> {
    if sequence_data.trim().is_empty() {
        return Err(ApiError::bad_request("sequence_data may not be blank."));
    }
    Ok(())
}

fn puzzle_not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("Puzzle {} not found", id))
}

#[derive(Debug, Deserialize)]
pub struct PuzzleListQuery {
    pub mission_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePuzzleRequest {
    #[serde(alias = "mission_id")]
    pub mission: i64,
    #[serde(default)]
    pub sequence_data: String,
    #[serde(default)]
    pub mutation_data: MutationList,
    pub status: Option<PuzzleStatus>,
    pub time_limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePuzzleRequest {
    pub sequence_data: Option<String>,
    pub mutation_data: Option<MutationList>,
    pub time_limit: Option<i32>,
}

/// GET /api/puzzles?mission_id= - Puzzles of one mission
///
/// Without `mission_id` the list is empty.
pub async fn list_puzzles(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<PuzzleListQuery>, QueryRejection>,
) -> Result<Json<Vec<Puzzle>>, ApiError> {
    let Query(query) = query?;
    let Some(mission_id) = query.mission_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.storage.list_puzzles(mission_id).await?))
}

/// POST /api/puzzles - Add a puzzle to a mission
pub async fn create_puzzle(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CreatePuzzleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Puzzle>), ApiError> {
    let Json(req) = payload?;
    validate_sequence(&req.sequence_data)?;
    let time_limit = req.time_limit.unwrap_or(DEFAULT_TIME_LIMIT_SECS);
    validate_time_limit(time_limit)?;
    let mutation_data = req.mutation_data.into_ids("mutation_data")?;

    if state.storage.get_mission(req.mission).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Mission {} does not exist.",
            req.mission
        )));
    }

    let puzzle = state
        .storage
        .create_puzzle(&NewPuzzle {
            mission_id: req.mission,
            sequence_data: req.sequence_data,
            mutation_data,
            status: req.status.unwrap_or_default(),
            time_limit,
        })
        .await?;
    info!(
        "Created puzzle {} in mission {} ({} mutations)",
        puzzle.id,
        puzzle.mission_id,
        puzzle.mutation_data.len()
    );

    Ok((StatusCode::CREATED, Json(puzzle)))
}

/// GET /api/puzzles/:id - Retrieve a puzzle
pub async fn get_puzzle(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Puzzle>, ApiError> {
    let Path(id) = id?;
    state
        .storage
        .get_puzzle(id)
        .await?
        .map(Json)
        .ok_or_else(|| puzzle_not_found(id))
}

/// PATCH|PUT /api/puzzles/:id - Update sequence, answer key or time limit
pub async fn update_puzzle(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdatePuzzleRequest>, JsonRejection>,
) -> Result<Json<Puzzle>, ApiError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    if let Some(sequence_data) = &req.sequence_data {
        validate_sequence(sequence_data)?;
    }
    if let Some(time_limit) = req.time_limit {
        validate_time_limit(time_limit)?;
    }

    let update = PuzzleUpdate {
        sequence_data: req.sequence_data,
        mutation_data: req
            .mutation_data
            .map(|m| m.into_ids("mutation_data"))
            .transpose()?,
        time_limit: req.time_limit,
    };
    state
        .storage
        .update_puzzle(id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| puzzle_not_found(id))
}

/// DELETE /api/puzzles/:id - Delete a puzzle and its submissions
pub async fn delete_puzzle(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    if !state.storage.delete_puzzle(id).await? {
        return Err(puzzle_not_found(id));
    }
    info!("Deleted puzzle {}", id);
    Ok(StatusCode::NO_CONTENT)
}
