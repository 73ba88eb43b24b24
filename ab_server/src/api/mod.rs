//! HTTP/WebSocket API for the game server.
//!
//! - [`websocket`]: the persistent bidirectional channel clients play over
//! - [`users`]: profile read/create, statistics, and leaderboard reads
//!
//! The live round is only reachable through the table actor's handle; the
//! HTTP side reads the ledger and history stores directly but never
//! touches round state.

pub mod users;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use andar_bahar::history::HistoryStore;
use andar_bahar::ledger::LedgerStore;
use andar_bahar::table::RoundHandle;

/// Application state shared across all handlers and WebSocket connections.
/// Cloning is cheap; everything inside is a handle or an Arc.
#[derive(Clone)]
pub struct AppState {
    pub table: RoundHandle,
    pub ledger: Arc<dyn LedgerStore>,
    pub history: Arc<dyn HistoryStore>,
}

/// Create the complete API router.
///
/// ```text
/// GET  /health                      - Health check
/// GET  /ws?key=<identity-key>       - WebSocket attach
/// POST /api/v1/users                - Get-or-create a player account
/// GET  /api/v1/users/{key}          - Read a player account
/// GET  /api/v1/users/{key}/stats    - Derived player statistics
/// GET  /api/v1/leaderboard          - Leaderboard (order=chips|wins|win_rate|streak)
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/users", post(users::create_user))
        .route("/users/{key}", get(users::get_user))
        .route("/users/{key}/stats", get(users::get_user_stats))
        .route("/leaderboard", get(users::get_leaderboard));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler))
        .nest("/api/v1", v1_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Verifies ledger-store connectivity and that the round actor is
/// responsive. Returns `200 OK` when both hold, `503` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.ledger.ping().await.is_ok();
    let round = state.table.snapshot().await.ok();
    let overall_healthy = store_healthy && round.is_some();

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "round": round.map(|s| json!({
            "sequence": s.sequence,
            "phase": s.phase,
            "players_online": s.players_online,
        })),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
