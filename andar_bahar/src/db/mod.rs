//! Database module providing PostgreSQL connection pooling and schema
//! bootstrap.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;

pub use config::DatabaseConfig;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it doesn't exist yet. Idempotent; run once at
    /// startup.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS players (
        key              TEXT PRIMARY KEY,
        chips            BIGINT NOT NULL DEFAULT 0 CHECK (chips >= 0),
        is_authenticated BOOLEAN NOT NULL DEFAULT FALSE,
        username         TEXT,
        display_name     TEXT,
        avatar_url       TEXT,
        bio              TEXT,
        location         TEXT,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id            BIGSERIAL PRIMARY KEY,
        player_key    TEXT NOT NULL,
        amount        BIGINT NOT NULL,
        balance_after BIGINT NOT NULL,
        direction     TEXT NOT NULL,
        reason        TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_ledger_entries_player
        ON ledger_entries (player_key, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rounds (
        sequence    BIGINT PRIMARY KEY,
        joker       JSONB NOT NULL,
        winner      TEXT NOT NULL,
        drawn_cards JSONB NOT NULL,
        pot_andar   BIGINT NOT NULL,
        pot_bahar   BIGINT NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS round_players (
        id             BIGSERIAL PRIMARY KEY,
        round_sequence BIGINT NOT NULL REFERENCES rounds(sequence),
        player_key     TEXT NOT NULL,
        side           TEXT NOT NULL,
        amount         BIGINT NOT NULL,
        won            BOOLEAN NOT NULL,
        payout         BIGINT NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_round_players_key
        ON round_players (player_key, round_sequence DESC)
    "#,
];
