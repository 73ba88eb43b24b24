//! Player account, statistics, and leaderboard endpoints.
//!
//! Thin reads over the ledger and history stores; none of these touch
//! live-round state.
//!
//! # Examples
//!
//! Read a player:
//! ```bash
//! curl http://localhost:4000/api/v1/users/12345
//! ```
//!
//! Leaderboard by win streak:
//! ```bash
//! curl "http://localhost:4000/api/v1/leaderboard?order=streak&limit=10"
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use andar_bahar::game::Chips;
use andar_bahar::history::stats::{self, LeaderboardOrder, LeaderboardRow, PlayerStats};
use andar_bahar::identity::Profile;
use andar_bahar::ledger::{LedgerError, PlayerAccount};

use super::AppState;

/// Outcomes consulted per player for statistics, newest first.
const STATS_WINDOW: i64 = 100;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub key: String,
    pub chips: Chips,
    pub is_authenticated: bool,
    #[serde(flatten)]
    pub profile: Profile,
}

impl From<PlayerAccount> for UserResponse {
    fn from(account: PlayerAccount) -> Self {
        Self {
            key: account.key,
            chips: account.chips,
            is_authenticated: account.is_authenticated,
            profile: account.profile,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub key: String,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub order: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(key: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no account for key {key}"),
        }),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

fn ledger_error(e: &LedgerError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.client_message(),
        }),
    )
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Read a player account by identity key. `404` if it was never created.
pub async fn get_user(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    match state.ledger.get(&key).await {
        Ok(Some(account)) => Ok(Json(account.into())),
        Ok(None) => Err(not_found(&key)),
        Err(e) => Err(ledger_error(&e)),
    }
}

/// Get-or-create a player account. New authenticated keys receive the
/// signup grant; profile fields, when present, are applied on top.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let key = request.key.trim().to_string();
    if key.is_empty() {
        return Err(bad_request("key required".to_string()));
    }

    let mut account = state.ledger.get_or_create(&key).await.map_err(|e| ledger_error(&e))?;

    if !request.profile.is_empty() {
        state
            .ledger
            .update_profile(&key, &request.profile)
            .await
            .map_err(|e| ledger_error(&e))?;
        account = state
            .ledger
            .get(&key)
            .await
            .map_err(|e| ledger_error(&e))?
            .ok_or_else(|| not_found(&key))?;
    }

    Ok(Json(account.into()))
}

/// Derived statistics for one player: games, wins, win rate, streaks, and
/// chip totals, computed over the most recent outcomes.
pub async fn get_user_stats(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PlayerStats>, ApiError> {
    let account = match state.ledger.get(&key).await {
        Ok(Some(account)) => account,
        Ok(None) => return Err(not_found(&key)),
        Err(e) => return Err(ledger_error(&e)),
    };

    let outcomes = state
        .history
        .outcomes_for_player(&key, STATS_WINDOW)
        .await
        .map_err(|_| internal_error("Internal server error"))?;

    Ok(Json(stats::compute(&outcomes, account.chips)))
}

/// Leaderboard over authenticated players, ordered by chips, wins, win
/// rate, or streak.
pub async fn get_leaderboard(
    Query(query): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardRow>>, ApiError> {
    let order: LeaderboardOrder = query
        .order
        .as_deref()
        .unwrap_or("chips")
        .parse()
        .map_err(bad_request)?;
    let limit = query.limit.unwrap_or(10).min(100);

    // Fetch a wider slice than requested so non-chip orderings have
    // candidates beyond the richest accounts.
    let accounts = state
        .ledger
        .authenticated_accounts((limit * 2).max(20) as i64)
        .await
        .map_err(|e| ledger_error(&e))?;

    let mut rows = Vec::with_capacity(accounts.len());
    for account in &accounts {
        let outcomes = state
            .history
            .outcomes_for_player(&account.key, STATS_WINDOW)
            .await
            .map_err(|_| internal_error("Internal server error"))?;
        rows.push(LeaderboardRow::new(account, stats::compute(&outcomes, account.chips)));
    }

    Ok(Json(stats::rank(rows, order, limit)))
}
