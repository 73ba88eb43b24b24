//! # Andar Bahar
//!
//! A server-authoritative Andar Bahar card game engine: one shared,
//! repeating round that many clients observe and bet on over a persistent
//! bidirectional channel.
//!
//! ## Architecture
//!
//! The round cycles through three phases:
//!
//! - **Lobby**: a 30-second betting window with a once-per-second countdown
//! - **Playing**: cards drawn alternately to andar and bahar until one
//!   matches the joker's rank
//! - **Results**: winning bets paid at 1.9x, the round archived, then a
//!   short settle delay before the next lobby
//!
//! All round state lives in a single actor task ([`table::RoundActor`]);
//! chip balances live in the persistent ledger ([`ledger::LedgerStore`])
//! and are only ever mutated through atomic deltas. Anonymous sessions can
//! later be claimed by an authenticated identity, merging the two balances
//! without losing or duplicating chips ([`identity`]).
//!
//! ## Core Modules
//!
//! - [`game`]: cards, the live round, and payout arithmetic
//! - [`table`]: the orchestrator actor, bet book, and wire events
//! - [`ledger`]: persistent balances with an append-only entry log
//! - [`identity`]: identity-key classes and reconciliation rules
//! - [`history`]: round archive plus statistics and leaderboards
//! - [`db`]: PostgreSQL pool and schema bootstrap
//!
//! ## Example
//!
//! ```no_run
//! use andar_bahar::ledger::MemoryLedgerStore;
//! use andar_bahar::history::MemoryHistoryStore;
//! use andar_bahar::table::{RoundActor, TableConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, handle) = RoundActor::new(
//!         TableConfig::default(),
//!         Arc::new(MemoryLedgerStore::new()),
//!         Arc::new(MemoryHistoryStore::new()),
//!     );
//!     tokio::spawn(actor.run());
//!     let snapshot = handle.snapshot().await.unwrap();
//!     println!("round {} in {}", snapshot.sequence, snapshot.phase);
//! }
//! ```

/// PostgreSQL connection pooling and schema bootstrap.
pub mod db;

/// Core game logic: cards, the live round, payout arithmetic.
pub mod game;

/// Round archive and derived statistics.
pub mod history;

/// Identity-key classes and reconciliation rules.
pub mod identity;

/// Persistent chip balances and the entry log.
pub mod ledger;

/// The round orchestrator actor.
pub mod table;

pub use game::{Card, Chips, Phase, Rank, Side, Suit};
pub use table::{RoundActor, RoundHandle, TableConfig};
