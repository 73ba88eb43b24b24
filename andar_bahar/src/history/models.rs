//! Round history data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{Card, Chips, DrawnCard, Side};

/// One player's outcome in a finished round.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlayerOutcome {
    pub key: String,
    pub side: Side,
    pub amount: Chips,
    pub won: bool,
    pub payout: Chips,
}

/// A finished round as archived to the history store. Appended exactly
/// once, at results; rounds with no bets are archived with an empty
/// player list so sequence numbering stays gapless for observers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RoundRecord {
    pub sequence: u64,
    pub joker: Card,
    pub winner: Side,
    pub drawn_cards: Vec<DrawnCard>,
    pub pot_andar: Chips,
    pub pot_bahar: Chips,
    pub players: Vec<PlayerOutcome>,
    pub finished_at: DateTime<Utc>,
}
