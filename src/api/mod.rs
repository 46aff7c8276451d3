//! REST API implementation.

pub mod auth;
pub mod errors;
pub mod missions;
pub mod puzzles;
pub mod submissions;

use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::models::MutationId;
use crate::storage::GameStorage;

pub use errors::ApiError;

/// Shared state for all API endpoints
pub struct ApiState {
    pub storage: Arc<dyn GameStorage>,
    pub auth: AuthConfig,
}

impl ApiState {
    pub fn new(storage: Arc<dyn GameStorage>, auth: AuthConfig) -> Self {
        Self { storage, auth }
    }
}

/// Mutation id list as sent by clients: a JSON array, or a string holding
/// a JSON array (form-style clients).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MutationList {
    Ids(Vec<MutationId>),
    Encoded(String),
}

impl Default for MutationList {
    fn default() -> Self {
        MutationList::Ids(Vec::new())
    }
}

impl MutationList {
    pub fn into_ids(self, field: &str) -> Result<Vec<MutationId>, ApiError> {
        match self {
            MutationList::Ids(ids) => Ok(ids),
            MutationList::Encoded(raw) => serde_json::from_str(raw.trim()).map_err(|_| {
                ApiError::bad_request(format!(
                    "{}: expected a list of integer mutation ids",
                    field
                ))
            }),
        }
    }
}

/// All `/api` routes. Paths carry no trailing slash; the server normalizes
/// incoming paths before routing.
pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route(
            "/api/missions",
            get(missions::list_missions).post(missions::create_mission),
        )
        .route(
            "/api/missions/:id",
            get(missions::get_mission)
                .patch(missions::update_mission)
                .put(missions::update_mission)
                .delete(missions::delete_mission),
        )
        .route("/api/missions/:id/start", get(missions::start_mission))
        .route(
            "/api/puzzles",
            get(puzzles::list_puzzles).post(puzzles::create_puzzle),
        )
        .route(
            "/api/puzzles/:id",
            get(puzzles::get_puzzle)
                .patch(puzzles::update_puzzle)
                .put(puzzles::update_puzzle)
                .delete(puzzles::delete_puzzle),
        )
        .route(
            "/api/submissions",
            get(submissions::list_submissions).post(submissions::create_submission),
        )
        .route("/api/submissions/:id", get(submissions::get_submission))
}
