//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::Chips;
use crate::identity::Profile;

/// A balance-holding identity record.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlayerAccount {
    pub key: String,
    pub chips: Chips,
    pub is_authenticated: bool,
    #[serde(flatten)]
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one balance mutation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub player_key: String,
    pub amount: Chips,
    pub balance_after: Chips,
    pub direction: EntryDirection,
    pub reason: EntryReason,
    pub created_at: DateTime<Utc>,
}

/// Entry direction
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Why a balance moved.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Wager debited at bet acceptance
    Bet,
    /// Winning-bet credit at results
    Payout,
    /// Signup grant for a new authenticated account
    Grant,
    /// Balance carried over from a merged anonymous account
    Merge,
    /// Operator adjustment
    Manual,
}

impl std::fmt::Display for EntryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryReason::Bet => write!(f, "bet"),
            EntryReason::Payout => write!(f, "payout"),
            EntryReason::Grant => write!(f, "grant"),
            EntryReason::Merge => write!(f, "merge"),
            EntryReason::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for EntryReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(EntryReason::Bet),
            "payout" => Ok(EntryReason::Payout),
            "grant" => Ok(EntryReason::Grant),
            "merge" => Ok(EntryReason::Merge),
            "manual" => Ok(EntryReason::Manual),
            other => Err(format!("unknown entry reason: {other}")),
        }
    }
}
