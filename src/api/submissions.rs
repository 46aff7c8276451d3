//! Puzzle submission endpoints.
//!
//! Submissions are append-only: there is no update or delete route.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::OptionalPlayer;
use super::{ApiError, ApiState, MutationList};
use crate::models::{MissionStatus, NewSubmission, PuzzleSubmission, SubmissionFilter};
use crate::scoring::{evaluate, Feedback, ScoreBreakdown};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub mission: i64,
    pub puzzle: i64,
    #[serde(default)]
    pub mutations_found: MutationList,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: i64,
    pub accuracy: f64,
    pub score: ScoreBreakdown,
    pub feedback: Feedback,
    pub mission_status: MissionStatus,
}

/// GET /api/submissions - List submissions, filtered by `?mission=&puzzle=&player=`
pub async fn list_submissions(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<SubmissionFilter>, QueryRejection>,
) -> Result<Json<Vec<PuzzleSubmission>>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(state.storage.list_submissions(&filter).await?))
}

/// GET /api/submissions/:id - Retrieve a submission
pub async fn get_submission(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PuzzleSubmission>, ApiError> {
    let Path(id) = id?;
    state
        .storage
        .get_submission(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Submission {} not found", id)))
}

/// POST /api/submissions - Score a puzzle attempt
///
/// Marks the puzzle completed and completes the mission once every puzzle
/// in it has been submitted. The authenticated player, if any, is recorded.
pub async fn create_submission(
    State(state): State<Arc<ApiState>>,
    OptionalPlayer(player): OptionalPlayer,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(req) = payload?;
    let mutations_found = req.mutations_found.into_ids("mutations_found")?;

    let mission = state
        .storage
        .get_mission(req.mission)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Mission {} not found", req.mission)))?;
    let puzzle = state
        .storage
        .get_puzzle(req.puzzle)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Puzzle {} not found", req.puzzle)))?;

    if puzzle.mission_id != mission.id {
        warn!(
            "Puzzle {} submitted against mission {} but belongs to {}",
            puzzle.id, mission.id, puzzle.mission_id
        );
        return Err(ApiError::bad_request("Puzzle does not belong to mission"));
    }
    if mission.status != MissionStatus::InProgress {
        warn!(
            "Submission rejected: mission {} is {}",
            mission.id, mission.status
        );
        return Err(ApiError::bad_request("Mission is not in progress"));
    }

    let evaluation = evaluate(&puzzle.mutation_data, &mutations_found);
    let recorded = state
        .storage
        .record_submission(&NewSubmission {
            player_id: player.as_ref().map(|p| p.id),
            mission_id: mission.id,
            puzzle_id: puzzle.id,
            mutations_found,
            score: evaluation.score(),
        })
        .await?;

    info!(
        "Submission {} scored: puzzle {} accuracy {:.2}% (mission {} {})",
        recorded.submission.id,
        puzzle.id,
        evaluation.accuracy,
        mission.id,
        recorded.mission_status
    );

    let accuracy = evaluation.rounded_accuracy();
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission_id: recorded.submission.id,
            accuracy,
            score: evaluation.breakdown,
            feedback: evaluation.feedback,
            mission_status: recorded.mission_status,
        }),
    ))
}
