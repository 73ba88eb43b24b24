//! The table: a single round orchestrator driven by an async actor.
//!
//! This module implements:
//! - `RoundActor`: the actor task owning the live round and bet book
//! - `RoundHandle`: message-based access with tokio channels
//! - The closed `ServerEvent` broadcast set and `TableMessage` inbox
//! - Table cadence configuration
//!
//! ## Architecture
//!
//! The actor runs in one tokio task with an mpsc inbox and a single phase
//! timer, selected over in one loop. Handlers run to completion, which
//! serializes every round-state mutation (bet acceptance, timer-driven
//! phase transitions, identity merges, detaches) without locks.

pub mod actor;
pub mod bets;
pub mod config;
pub mod messages;

pub use actor::{RoundActor, RoundHandle};
pub use bets::{Bet, BetBook};
pub use config::TableConfig;
pub use messages::{
    Attached, BetAck, ClaimAck, ConnectionId, ServerEvent, TableError, TableMessage,
};
