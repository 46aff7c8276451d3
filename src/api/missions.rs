//! Mission endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ApiError, ApiState};
use crate::models::{Mission, MissionStatus, MissionUpdate, NewMission};

const NAME_MAX_LENGTH: usize = 255;

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request("Mission name may not be blank."));
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Mission name may not have more than {} characters.",
            NAME_MAX_LENGTH
        )));
    }
    Ok(())
}

fn mission_not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("Mission {} not found", id))
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MissionListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<MissionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMissionRequest {
    #[serde(alias = "title")]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/missions - List missions, optionally filtered by `?status=`
pub async fn list_missions(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<MissionListQuery>, QueryRejection>,
) -> Result<Json<Vec<Mission>>, ApiError> {
    let Query(query) = query?;
    let status = query
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<MissionStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    Ok(Json(state.storage.list_missions(status).await?))
}

/// POST /api/missions - Create a mission
pub async fn create_mission(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CreateMissionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    let Json(req) = payload?;
    validate_name(&req.name)?;

    let mission = state
        .storage
        .create_mission(&NewMission {
            name: req.name,
            description: req.description,
            status: req.status.unwrap_or_default(),
        })
        .await?;
    info!("Created mission {} ({})", mission.id, mission.name);

    Ok((StatusCode::CREATED, Json(mission)))
}

/// GET /api/missions/:id - Retrieve a mission
pub async fn get_mission(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Mission>, ApiError> {
    let Path(id) = id?;
    state
        .storage
        .get_mission(id)
        .await?
        .map(Json)
        .ok_or_else(|| mission_not_found(id))
}

/// PATCH|PUT /api/missions/:id - Update name and description
///
/// Status is not writable here; it only moves through start and completion.
pub async fn update_mission(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateMissionRequest>, JsonRejection>,
) -> Result<Json<Mission>, ApiError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    if let Some(name) = &req.name {
        validate_name(name)?;
    }

    let update = MissionUpdate {
        name: req.name,
        description: req.description,
    };
    state
        .storage
        .update_mission(id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| mission_not_found(id))
}

/// DELETE /api/missions/:id - Delete a mission with its puzzles and submissions
pub async fn delete_mission(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    if !state.storage.delete_mission(id).await? {
        return Err(mission_not_found(id));
    }
    info!("Deleted mission {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/missions/:id/start - Move a pending mission to in_progress
pub async fn start_mission(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    let mission = state
        .storage
        .get_mission(id)
        .await?
        .ok_or_else(|| mission_not_found(id))?;

    // The conditional update still guards against a concurrent start
    let started = mission.status.can_transition_to(MissionStatus::InProgress)
        && state
            .storage
            .transition_mission(id, mission.status, MissionStatus::InProgress)
            .await?;
    if !started {
        warn!("Mission {} already started or completed", id);
        return Err(ApiError::bad_request("Mission already started or completed"));
    }

    info!("Mission {} started", id);
    Ok(Json(MessageResponse {
        message: "Mission started",
    }))
}
