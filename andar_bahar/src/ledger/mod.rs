//! Persistent chip ledger: player accounts, balances, and the entry log.
//!
//! This module implements:
//! - Balance mutations expressed only as atomic guarded deltas
//! - An append-only entry per mutation (debit/credit, reason, balance after)
//! - Single-transaction identity merge (claimed anonymous sessions)
//! - Signup grants for newly created authenticated accounts
//!
//! Balances are exclusively owned by the store; callers never treat a
//! cached balance as ground truth.

pub mod errors;
pub mod models;
pub mod store;

pub use errors::{LedgerError, LedgerResult};
pub use models::{EntryDirection, EntryReason, LedgerEntry, PlayerAccount};
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
