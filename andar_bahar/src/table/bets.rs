//! In-round bet ledger, cleared every round.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::messages::ConnectionId;
use crate::game::{Chips, Side};

/// An accepted bet. The wagered amount was debited from the identity's
/// balance before this record was created; the two always exist together.
#[derive(Clone, Debug)]
pub struct Bet {
    pub key: String,
    pub side: Side,
    pub amount: Chips,
    /// Connection that placed the bet, used only for targeted payout
    /// reporting. Cleared on detach; the bet itself stays in play.
    pub conn_id: Option<ConnectionId>,
    pub placed_at: DateTime<Utc>,
}

/// At most one bet per identity per round.
#[derive(Debug, Default)]
pub struct BetBook {
    by_key: HashMap<String, Bet>,
}

impl BetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Record an accepted bet. The caller has already checked for a
    /// duplicate and confirmed the debit.
    pub fn record(&mut self, bet: Bet) {
        debug_assert!(!self.contains(&bet.key));
        self.by_key.insert(bet.key.clone(), bet);
    }

    /// Re-attribute a bet after an identity merge, so payout reaches the
    /// surviving identity. No-op if the old key has no bet.
    pub fn reattribute(&mut self, old_key: &str, new_key: &str) -> bool {
        match self.by_key.remove(old_key) {
            Some(mut bet) => {
                bet.key = new_key.to_string();
                self.by_key.insert(new_key.to_string(), bet);
                true
            }
            None => false,
        }
    }

    /// Forget a detached connection. The bet stays: the debit already
    /// happened and payout targets the identity, not the connection.
    pub fn release_connection(&mut self, conn_id: ConnectionId) {
        for bet in self.by_key.values_mut() {
            if bet.conn_id == Some(conn_id) {
                bet.conn_id = None;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn bet(key: &str, conn_id: Option<ConnectionId>) -> Bet {
        Bet {
            key: key.to_string(),
            side: Side::Andar,
            amount: 100,
            conn_id,
            placed_at: Utc::now(),
        }
    }

    #[test]
    fn one_bet_per_identity() {
        let mut book = BetBook::new();
        assert!(!book.contains("a"));
        book.record(bet("a", None));
        assert!(book.contains("a"));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn reattribute_moves_the_bet_to_the_new_key() {
        let mut book = BetBook::new();
        book.record(bet("u_local", None));

        assert!(book.reattribute("u_local", "12345"));
        assert!(!book.contains("u_local"));
        assert!(book.contains("12345"));
        let moved = book.iter().next().unwrap();
        assert_eq!(moved.key, "12345");
        assert_eq!(moved.amount, 100);

        assert!(!book.reattribute("missing", "12345"));
    }

    #[test]
    fn releasing_a_connection_keeps_the_bet() {
        let conn = Uuid::new_v4();
        let mut book = BetBook::new();
        book.record(bet("a", Some(conn)));

        book.release_connection(conn);
        assert!(book.contains("a"), "detach must not cancel the bet");
        assert_eq!(book.iter().next().unwrap().conn_id, None);
    }

    #[test]
    fn clear_empties_the_book() {
        let mut book = BetBook::new();
        book.record(bet("a", None));
        book.record(bet("b", None));
        book.clear();
        assert!(book.is_empty());
    }
}
