//! History store trait and its Postgres / in-memory implementations.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::{Arc, Mutex};

use super::errors::HistoryResult;
use super::models::{PlayerOutcome, RoundRecord};

/// Append-only round archive.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Archive a finished round with its per-player outcomes.
    async fn append(&self, record: &RoundRecord) -> HistoryResult<()>;

    /// A player's outcomes, newest round first.
    async fn outcomes_for_player(&self, key: &str, limit: i64)
    -> HistoryResult<Vec<PlayerOutcome>>;

    /// Recently finished rounds, newest first.
    async fn recent_rounds(&self, limit: i64) -> HistoryResult<Vec<RoundRecord>>;
}

/// PostgreSQL-backed history store. The drawn-card sequence and joker are
/// stored as JSONB documents alongside the scalar round columns.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: Arc<PgPool>,
}

impl PgHistoryStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, record: &RoundRecord) -> HistoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rounds (sequence, joker, winner, drawn_cards, pot_andar, pot_bahar, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (sequence) DO NOTHING
            "#,
        )
        .bind(record.sequence as i64)
        .bind(serde_json::to_value(record.joker)?)
        .bind(record.winner.to_string())
        .bind(serde_json::to_value(&record.drawn_cards)?)
        .bind(record.pot_andar)
        .bind(record.pot_bahar)
        .bind(record.finished_at)
        .execute(&mut *tx)
        .await?;

        for player in &record.players {
            sqlx::query(
                r#"
                INSERT INTO round_players (round_sequence, player_key, side, amount, won, payout)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.sequence as i64)
            .bind(&player.key)
            .bind(player.side.to_string())
            .bind(player.amount)
            .bind(player.won)
            .bind(player.payout)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn outcomes_for_player(
        &self,
        key: &str,
        limit: i64,
    ) -> HistoryResult<Vec<PlayerOutcome>> {
        let rows = sqlx::query(
            r#"
            SELECT player_key, side, amount, won, payout
            FROM round_players
            WHERE player_key = $1
            ORDER BY round_sequence DESC
            LIMIT $2
            "#,
        )
        .bind(key)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let outcomes = rows
            .into_iter()
            .map(|row| {
                Ok(PlayerOutcome {
                    key: row.get("player_key"),
                    side: serde_json::from_value(serde_json::Value::String(
                        row.get::<String, _>("side"),
                    ))?,
                    amount: row.get("amount"),
                    won: row.get("won"),
                    payout: row.get("payout"),
                })
            })
            .collect::<HistoryResult<Vec<_>>>()?;

        Ok(outcomes)
    }

    async fn recent_rounds(&self, limit: i64) -> HistoryResult<Vec<RoundRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, joker, winner, drawn_cards, pot_andar, pot_bahar, finished_at
            FROM rounds
            ORDER BY sequence DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(RoundRecord {
                sequence: row.get::<i64, _>("sequence") as u64,
                joker: serde_json::from_value(row.get("joker"))?,
                winner: serde_json::from_value(serde_json::Value::String(
                    row.get::<String, _>("winner"),
                ))?,
                drawn_cards: serde_json::from_value(row.get("drawn_cards"))?,
                pot_andar: row.get("pot_andar"),
                pot_bahar: row.get("pot_bahar"),
                players: Vec::new(),
                finished_at: row.get("finished_at"),
            });
        }

        Ok(records)
    }
}

/// In-memory history store for tests and database-less local runs.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rounds: Mutex<Vec<RoundRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RoundRecord>> {
        self.rounds.lock().expect("history store lock poisoned")
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: &RoundRecord) -> HistoryResult<()> {
        self.lock().push(record.clone());
        Ok(())
    }

    async fn outcomes_for_player(
        &self,
        key: &str,
        limit: i64,
    ) -> HistoryResult<Vec<PlayerOutcome>> {
        let rounds = self.lock();
        Ok(rounds
            .iter()
            .rev()
            .flat_map(|r| r.players.iter().filter(|p| p.key == key))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn recent_rounds(&self, limit: i64) -> HistoryResult<Vec<RoundRecord>> {
        let rounds = self.lock();
        Ok(rounds
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Card, Rank, Side, Suit};
    use chrono::Utc;

    fn record(sequence: u64, players: Vec<PlayerOutcome>) -> RoundRecord {
        RoundRecord {
            sequence,
            joker: Card::new(Rank::Seven, Suit::Hearts),
            winner: Side::Andar,
            drawn_cards: Vec::new(),
            pot_andar: players.iter().filter(|p| p.side == Side::Andar).map(|p| p.amount).sum(),
            pot_bahar: players.iter().filter(|p| p.side == Side::Bahar).map(|p| p.amount).sum(),
            players,
            finished_at: Utc::now(),
        }
    }

    fn outcome(key: &str, won: bool) -> PlayerOutcome {
        PlayerOutcome {
            key: key.to_string(),
            side: Side::Andar,
            amount: 100,
            won,
            payout: if won { 190 } else { 0 },
        }
    }

    #[tokio::test]
    async fn outcomes_come_back_newest_first() {
        let store = MemoryHistoryStore::new();
        store.append(&record(1, vec![outcome("a", true)])).await.unwrap();
        store.append(&record(2, vec![outcome("a", false)])).await.unwrap();
        store.append(&record(3, vec![outcome("b", true)])).await.unwrap();

        let outcomes = store.outcomes_for_player("a", 10).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].won, "round 2 outcome first");
        assert!(outcomes[1].won);
    }

    #[tokio::test]
    async fn empty_rounds_are_archived_too() {
        let store = MemoryHistoryStore::new();
        store.append(&record(1, Vec::new())).await.unwrap();

        let rounds = store.recent_rounds(10).await.unwrap();
        assert_eq!(rounds.len(), 1);
        assert!(rounds[0].players.is_empty());
    }
}
