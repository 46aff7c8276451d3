//! Registration, login and token authentication.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ApiError, ApiState};
use crate::auth::{
    generate_token, hash_password, is_valid_email, parse_authorization, validate_password,
    validate_username, verify_password,
};
use crate::models::{NewPlayer, Player};

// ============================================================================
// TOKEN EXTRACTOR
// ============================================================================

/// The player behind the request's `Authorization` header, if any.
///
/// A missing header yields `None`. A header that is present but malformed
/// or unknown rejects the request with 401.
pub struct OptionalPlayer(pub Option<Player>);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for OptionalPlayer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(OptionalPlayer(None));
        };
        let key = header
            .to_str()
            .ok()
            .and_then(parse_authorization)
            .ok_or_else(|| ApiError::Unauthorized("Invalid token header.".to_string()))?;

        match state.storage.player_for_token(key).await? {
            Some(player) => Ok(OptionalPlayer(Some(player))),
            None => Err(ApiError::Unauthorized("Invalid token.".to_string())),
        }
    }
}

// ============================================================================
// REGISTER / LOGIN
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub message: &'static str,
}

async fn issue_token(
    state: &ApiState,
    player: Player,
    message: &'static str,
) -> Result<Json<AuthResponse>, ApiError> {
    let candidate = generate_token(state.auth.token_bytes);
    let token = state
        .storage
        .get_or_create_token(player.id, &candidate)
        .await?;
    Ok(Json(AuthResponse {
        token,
        user_id: player.id,
        username: player.username,
        email: player.email,
        message,
    }))
}

/// POST /api/register - Create a player and return its token
pub async fn register(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();

    validate_username(&username, &state.auth).map_err(ApiError::BadRequest)?;
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Enter a valid email address."));
    }
    validate_password(&req.password, &state.auth).map_err(ApiError::BadRequest)?;

    if state.storage.username_exists(&username).await? {
        warn!("Registration rejected: username {} taken", username);
        return Err(ApiError::bad_request("Username already exists."));
    }
    if state.storage.email_exists(&email).await? {
        warn!("Registration rejected: email already in use");
        return Err(ApiError::bad_request("Email already exists."));
    }

    let iterations = state.auth.hash_iterations;
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {}", e)))?;

    let player = state
        .storage
        .create_player(&NewPlayer {
            username,
            email,
            password_hash,
        })
        .await?;
    info!("Registered player {} ({})", player.id, player.username);

    issue_token(&state, player, "Successfully registered and logged in").await
}

/// POST /api/login - Exchange credentials for the player's token
pub async fn login(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(ApiError::bad_request(
            "Must include \"username\" and \"password\".",
        ));
    };
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request(
            "Must include \"username\" and \"password\".",
        ));
    }

    let invalid = || ApiError::bad_request("Unable to log in with provided credentials.");

    let Some(player) = state.storage.find_player_by_username(username).await? else {
        warn!("Login failed: unknown username");
        return Err(invalid());
    };

    let encoded = player.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| ApiError::Internal(format!("password check task failed: {}", e)))?;
    if !verified {
        warn!("Login failed for player {}", player.id);
        return Err(invalid());
    }

    info!("Player {} logged in", player.id);
    issue_token(&state, player, "Successfully logged in").await
}
