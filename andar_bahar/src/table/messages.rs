//! Table actor message and event types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::game::{Chips, DrawnCard, Pots, RoundSnapshot, Side};
use crate::identity::Profile;
use crate::ledger::LedgerError;

/// Identifies one attached connection for its lifetime.
pub type ConnectionId = Uuid;

/// Messages that can be sent to the table actor.
#[derive(Debug)]
pub enum TableMessage {
    /// Attach a connection under a resolved identity key. The sender half
    /// is where broadcast events for this connection are delivered.
    Attach {
        conn_id: ConnectionId,
        key: String,
        events: mpsc::Sender<ServerEvent>,
        response: oneshot::Sender<Result<Attached, TableError>>,
    },

    /// Wager on a side during the lobby phase.
    PlaceBet {
        conn_id: ConnectionId,
        side: Side,
        amount: Chips,
        response: oneshot::Sender<Result<BetAck, TableError>>,
    },

    /// Read the connection's current balance.
    RequestBalance {
        conn_id: ConnectionId,
        response: oneshot::Sender<Result<Chips, TableError>>,
    },

    /// Claim an authenticated identity for a connection, merging the
    /// current anonymous identity into it if there is one.
    ClaimIdentity {
        conn_id: ConnectionId,
        key: String,
        profile: Profile,
        response: oneshot::Sender<Result<ClaimAck, TableError>>,
    },

    /// Detach a connection. Any accepted bet stays in play.
    Detach { conn_id: ConnectionId },

    /// Read-only snapshot of the live round.
    GetSnapshot {
        response: oneshot::Sender<RoundSnapshot>,
    },
}

/// Reply to a successful attach.
#[derive(Debug)]
pub struct Attached {
    pub balance: Chips,
    pub snapshot: RoundSnapshot,
}

/// Reply to an accepted bet.
#[derive(Debug)]
pub struct BetAck {
    pub side: Side,
    pub amount: Chips,
    pub balance: Chips,
    pub pots: Pots,
}

/// Reply to a successful identity claim.
#[derive(Debug)]
pub struct ClaimAck {
    pub key: String,
    pub balance: Chips,
}

/// Errors reported to the originating connection. None of these mutate
/// round state.
#[derive(Debug, Error)]
pub enum TableError {
    /// Bets are only accepted during the lobby phase.
    #[error("Bets are closed")]
    BetClosed,

    /// Wager amounts must be positive.
    #[error("Invalid bet amount: {0}")]
    InvalidAmount(Chips),

    /// One bet per identity per round.
    #[error("Bet already placed this round")]
    DuplicateBet,

    /// The connection never attached or already detached.
    #[error("Unknown connection")]
    UnknownConnection,

    /// Claimed keys must be authenticated identity keys.
    #[error("Not an authenticated identity key")]
    UnauthenticatedKey,

    /// The table actor is gone.
    #[error("Table is closed")]
    TableClosed,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TableError {
    /// Client-safe message that doesn't leak store internals.
    pub fn client_message(&self) -> String {
        match self {
            TableError::Ledger(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Events pushed to attached connections. A closed set: every message the
/// server can emit is a variant here, serialized with a `type` tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The connection's balance changed (targeted).
    BalanceChanged { balance: Chips },

    /// Full round snapshot; sent on attach and on every phase transition.
    RoundState(RoundSnapshot),

    /// Bet accepted (targeted at the bettor).
    BetAccepted { side: Side, amount: Chips, pots: Pots },

    /// Pot totals changed (broadcast).
    PotUpdate { pots: Pots },

    /// A card was drawn (broadcast, in generation order).
    CardDrawn(DrawnCard),

    /// The round finished. Payouts are keyed by connection id and only
    /// include winning connections still known to the round.
    RoundComplete {
        winner: Side,
        total_cards: usize,
        payouts: HashMap<ConnectionId, Chips>,
    },

    /// Lobby countdown tick (broadcast).
    CountdownTick { seconds_left: u32 },

    /// Request-level error (targeted).
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Card, Phase, Rank, Suit};

    #[test]
    fn server_events_serialize_with_a_type_tag() {
        let event = ServerEvent::CountdownTick { seconds_left: 12 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"countdown_tick","seconds_left":12}"#);

        let event = ServerEvent::CardDrawn(DrawnCard {
            card: Card::new(Rank::Seven, Suit::Hearts),
            side: Side::Andar,
            is_match: true,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"card_drawn","card":{"rank":"7","suit":"♥"},"side":"andar","is_match":true}"#
        );
    }

    #[test]
    fn round_state_event_inlines_the_snapshot() {
        let snapshot = RoundSnapshot {
            phase: Phase::Lobby,
            sequence: 3,
            joker: Card::new(Rank::Ace, Suit::Spades),
            drawn_cards: Vec::new(),
            pots: Pots::default(),
            winner: None,
            countdown: 30,
            players_online: 2,
            last_winner: Some(Side::Bahar),
            last_joker: None,
        };
        let json = serde_json::to_value(ServerEvent::RoundState(snapshot)).unwrap();
        assert_eq!(json["type"], "round_state");
        assert_eq!(json["phase"], "lobby");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["last_winner"], "bahar");
    }
}
