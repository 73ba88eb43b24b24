//! Round history: append-only archive of finished rounds and the derived
//! statistics/leaderboard views read from it.
//!
//! The orchestrator only ever appends here, once per finished round; the
//! read side serves statistics and leaderboards and never feeds back into
//! live-round state.

pub mod errors;
pub mod models;
pub mod stats;
pub mod store;

pub use errors::{HistoryError, HistoryResult};
pub use models::{PlayerOutcome, RoundRecord};
pub use stats::{LeaderboardOrder, LeaderboardRow, PlayerStats};
pub use store::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
