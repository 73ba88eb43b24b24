//! Ledger store trait and its Postgres / in-memory implementations.
//!
//! Every balance mutation is an atomic delta at the store level: a guarded
//! `UPDATE ... SET chips = chips - $n ... WHERE chips >= $n` for debits, a
//! plain increment for credits, and a single transaction for the identity
//! merge. Concurrent deltas therefore compose correctly regardless of
//! interleaving; read-modify-write against a cached balance is never used.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::errors::{LedgerError, LedgerResult};
use super::models::{EntryDirection, EntryReason, LedgerEntry, PlayerAccount};
use crate::game::Chips;
use crate::game::constants::SIGNUP_GRANT;
use crate::identity::{Profile, is_authenticated_key};

/// Persistent chip ledger operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the account for a key, creating it on first contact. New
    /// authenticated accounts receive the signup grant; local accounts
    /// start empty.
    async fn get_or_create(&self, key: &str) -> LedgerResult<PlayerAccount>;

    /// Load an account if it exists.
    async fn get(&self, key: &str) -> LedgerResult<Option<PlayerAccount>>;

    /// Current balance for a key.
    async fn balance(&self, key: &str) -> LedgerResult<Chips>;

    /// Atomically debit `amount`, guarded by `chips >= amount`. Returns the
    /// new balance. Fails without mutating when funds are short.
    async fn debit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips>;

    /// Atomically credit `amount`. Returns the new balance.
    async fn credit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips>;

    /// Merge a local account into an authenticated one as a single
    /// store-level transaction: the authenticated balance becomes the sum,
    /// the local record is deleted, and the profile is applied. Returns the
    /// merged balance. A missing local account contributes nothing.
    async fn merge_accounts(
        &self,
        local_key: &str,
        auth_key: &str,
        profile: &Profile,
    ) -> LedgerResult<Chips>;

    /// Apply profile fields to an existing account, keeping current values
    /// where the new profile is silent.
    async fn update_profile(&self, key: &str, profile: &Profile) -> LedgerResult<()>;

    /// Recent ledger entries for a key, newest first.
    async fn entries(&self, key: &str, limit: i64) -> LedgerResult<Vec<LedgerEntry>>;

    /// Authenticated accounts ordered by balance, for leaderboard reads.
    async fn authenticated_accounts(&self, limit: i64) -> LedgerResult<Vec<PlayerAccount>>;

    /// Store connectivity check.
    async fn ping(&self) -> LedgerResult<()>;
}

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
}

impl PgLedgerStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn create_entry(
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        amount: Chips,
        balance_after: Chips,
        direction: EntryDirection,
        reason: EntryReason,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (player_key, amount, balance_after, direction, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(key)
        .bind(amount)
        .bind(balance_after)
        .bind(direction.to_string())
        .bind(reason.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn row_to_account(row: &PgRow) -> PlayerAccount {
    PlayerAccount {
        key: row.get("key"),
        chips: row.get("chips"),
        is_authenticated: row.get("is_authenticated"),
        profile: Profile {
            username: row.get("username"),
            display_name: row.get("display_name"),
            avatar_url: row.get("avatar_url"),
            bio: row.get("bio"),
            location: row.get("location"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const ACCOUNT_COLUMNS: &str = "key, chips, is_authenticated, username, display_name, \
                               avatar_url, bio, location, created_at, updated_at";

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_or_create(&self, key: &str) -> LedgerResult<PlayerAccount> {
        if let Some(account) = self.get(key).await? {
            return Ok(account);
        }

        let authenticated = is_authenticated_key(key);
        let grant = if authenticated { SIGNUP_GRANT } else { 0 };

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO players (key, chips, is_authenticated)
             VALUES ($1, $2, $3)
             ON CONFLICT (key) DO NOTHING
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(key)
        .bind(grant)
        .bind(authenticated)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                if grant > 0 {
                    Self::create_entry(&mut tx, key, grant, grant, EntryDirection::Credit, EntryReason::Grant)
                        .await?;
                }
                tx.commit().await?;
                Ok(row_to_account(&row))
            }
            None => {
                // Lost a create race; the existing row wins.
                tx.commit().await?;
                self.get(key)
                    .await?
                    .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))
            }
        }
    }

    async fn get(&self, key: &str) -> LedgerResult<Option<PlayerAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM players WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|r| row_to_account(&r)))
    }

    async fn balance(&self, key: &str) -> LedgerResult<Chips> {
        let row = sqlx::query("SELECT chips FROM players WHERE key = $1")
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))?;

        Ok(row.get("chips"))
    }

    async fn debit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE players
             SET chips = chips - $1, updated_at = NOW()
             WHERE key = $2 AND chips >= $1
             RETURNING chips",
        )
        .bind(amount)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let new_balance: Chips = match result {
            Some(row) => row.get("chips"),
            None => {
                // Either the account doesn't exist or funds are short.
                let check = sqlx::query("SELECT chips FROM players WHERE key = $1")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;

                return match check {
                    Some(row) => Err(LedgerError::InsufficientChips {
                        available: row.get("chips"),
                        required: amount,
                    }),
                    None => Err(LedgerError::AccountNotFound(key.to_string())),
                };
            }
        };

        Self::create_entry(&mut tx, key, -amount, new_balance, EntryDirection::Debit, reason)
            .await?;

        tx.commit().await?;

        Ok(new_balance)
    }

    async fn credit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE players
             SET chips = chips + $1, updated_at = NOW()
             WHERE key = $2
             RETURNING chips",
        )
        .bind(amount)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))?;

        let new_balance: Chips = row.get("chips");

        Self::create_entry(&mut tx, key, amount, new_balance, EntryDirection::Credit, reason)
            .await?;

        tx.commit().await?;

        Ok(new_balance)
    }

    async fn merge_accounts(
        &self,
        local_key: &str,
        auth_key: &str,
        profile: &Profile,
    ) -> LedgerResult<Chips> {
        let mut tx = self.pool.begin().await?;

        // Lock the local row so a concurrent delta can't land between the
        // read and the delete.
        let local_row = sqlx::query("SELECT chips FROM players WHERE key = $1 FOR UPDATE")
            .bind(local_key)
            .fetch_optional(&mut *tx)
            .await?;
        let local_chips: Chips = local_row.as_ref().map_or(0, |r| r.get("chips"));

        let row = sqlx::query(
            "INSERT INTO players (key, chips, is_authenticated,
                                  username, display_name, avatar_url, bio, location)
             VALUES ($1, $2, TRUE, $3, $4, $5, $6, $7)
             ON CONFLICT (key) DO UPDATE SET
                chips = players.chips + EXCLUDED.chips,
                is_authenticated = TRUE,
                username = COALESCE(EXCLUDED.username, players.username),
                display_name = COALESCE(EXCLUDED.display_name, players.display_name),
                avatar_url = COALESCE(EXCLUDED.avatar_url, players.avatar_url),
                bio = COALESCE(EXCLUDED.bio, players.bio),
                location = COALESCE(EXCLUDED.location, players.location),
                updated_at = NOW()
             RETURNING chips",
        )
        .bind(auth_key)
        .bind(local_chips)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .bind(&profile.location)
        .fetch_one(&mut *tx)
        .await?;

        let merged: Chips = row.get("chips");

        if local_row.is_some() {
            sqlx::query("DELETE FROM players WHERE key = $1")
                .bind(local_key)
                .execute(&mut *tx)
                .await?;

            if local_chips > 0 {
                Self::create_entry(
                    &mut tx,
                    auth_key,
                    local_chips,
                    merged,
                    EntryDirection::Credit,
                    EntryReason::Merge,
                )
                .await?;
            }
        }

        tx.commit().await?;

        Ok(merged)
    }

    async fn update_profile(&self, key: &str, profile: &Profile) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE players
             SET username = COALESCE($2, username),
                 display_name = COALESCE($3, display_name),
                 avatar_url = COALESCE($4, avatar_url),
                 bio = COALESCE($5, bio),
                 location = COALESCE($6, location),
                 updated_at = NOW()
             WHERE key = $1",
        )
        .bind(key)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .bind(&profile.location)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(key.to_string()));
        }

        Ok(())
    }

    async fn entries(&self, key: &str, limit: i64) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, player_key, amount, balance_after, direction, reason, created_at
             FROM ledger_entries
             WHERE player_key = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(key)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| LedgerEntry {
                id: row.get("id"),
                player_key: row.get("player_key"),
                amount: row.get("amount"),
                balance_after: row.get("balance_after"),
                direction: match row.get::<String, _>("direction").as_str() {
                    "debit" => EntryDirection::Debit,
                    _ => EntryDirection::Credit,
                },
                reason: row
                    .get::<String, _>("reason")
                    .parse()
                    .unwrap_or(EntryReason::Manual),
                created_at: row.get("created_at"),
            })
            .collect();

        Ok(entries)
    }

    async fn authenticated_accounts(&self, limit: i64) -> LedgerResult<Vec<PlayerAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM players
             WHERE is_authenticated
             ORDER BY chips DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    async fn ping(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }
}

/// In-memory ledger store for tests and database-less local runs.
///
/// Mirrors the Postgres semantics, with the whole store behind one lock so
/// every operation, the merge included, is atomic.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<String, PlayerAccount>,
    entries: Vec<LedgerEntry>,
    next_entry_id: i64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("ledger store lock poisoned")
    }
}

impl MemoryInner {
    fn push_entry(
        &mut self,
        key: &str,
        amount: Chips,
        balance_after: Chips,
        direction: EntryDirection,
        reason: EntryReason,
    ) {
        self.next_entry_id += 1;
        self.entries.push(LedgerEntry {
            id: self.next_entry_id,
            player_key: key.to_string(),
            amount,
            balance_after,
            direction,
            reason,
            created_at: Utc::now(),
        });
    }

    fn create_account(&mut self, key: &str) -> PlayerAccount {
        let authenticated = is_authenticated_key(key);
        let grant = if authenticated { SIGNUP_GRANT } else { 0 };
        let now = Utc::now();
        let account = PlayerAccount {
            key: key.to_string(),
            chips: grant,
            is_authenticated: authenticated,
            profile: Profile::default(),
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(key.to_string(), account.clone());
        if grant > 0 {
            self.push_entry(key, grant, grant, EntryDirection::Credit, EntryReason::Grant);
        }
        account
    }
}

fn apply_profile(account: &mut PlayerAccount, profile: &Profile) {
    let target = &mut account.profile;
    if profile.username.is_some() {
        target.username = profile.username.clone();
    }
    if profile.display_name.is_some() {
        target.display_name = profile.display_name.clone();
    }
    if profile.avatar_url.is_some() {
        target.avatar_url = profile.avatar_url.clone();
    }
    if profile.bio.is_some() {
        target.bio = profile.bio.clone();
    }
    if profile.location.is_some() {
        target.location = profile.location.clone();
    }
    account.updated_at = Utc::now();
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_or_create(&self, key: &str) -> LedgerResult<PlayerAccount> {
        let mut inner = self.lock();
        if let Some(account) = inner.accounts.get(key) {
            return Ok(account.clone());
        }
        Ok(inner.create_account(key))
    }

    async fn get(&self, key: &str) -> LedgerResult<Option<PlayerAccount>> {
        Ok(self.lock().accounts.get(key).cloned())
    }

    async fn balance(&self, key: &str) -> LedgerResult<Chips> {
        self.lock()
            .accounts
            .get(key)
            .map(|a| a.chips)
            .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))
    }

    async fn debit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(key)
            .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))?;
        if account.chips < amount {
            return Err(LedgerError::InsufficientChips {
                available: account.chips,
                required: amount,
            });
        }
        account.chips -= amount;
        account.updated_at = Utc::now();
        let new_balance = account.chips;
        inner.push_entry(key, -amount, new_balance, EntryDirection::Debit, reason);
        Ok(new_balance)
    }

    async fn credit(&self, key: &str, amount: Chips, reason: EntryReason) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(key)
            .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))?;
        account.chips += amount;
        account.updated_at = Utc::now();
        let new_balance = account.chips;
        inner.push_entry(key, amount, new_balance, EntryDirection::Credit, reason);
        Ok(new_balance)
    }

    async fn merge_accounts(
        &self,
        local_key: &str,
        auth_key: &str,
        profile: &Profile,
    ) -> LedgerResult<Chips> {
        let mut inner = self.lock();

        let local = inner.accounts.remove(local_key);
        let local_chips = local.as_ref().map_or(0, |a| a.chips);

        if !inner.accounts.contains_key(auth_key) {
            let now = Utc::now();
            inner.accounts.insert(
                auth_key.to_string(),
                PlayerAccount {
                    key: auth_key.to_string(),
                    chips: 0,
                    is_authenticated: true,
                    profile: Profile::default(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        let account = inner
            .accounts
            .get_mut(auth_key)
            .ok_or_else(|| LedgerError::AccountNotFound(auth_key.to_string()))?;
        account.chips += local_chips;
        account.is_authenticated = true;
        apply_profile(account, profile);
        let merged = account.chips;

        if local.is_some() && local_chips > 0 {
            inner.push_entry(auth_key, local_chips, merged, EntryDirection::Credit, EntryReason::Merge);
        }

        Ok(merged)
    }

    async fn update_profile(&self, key: &str, profile: &Profile) -> LedgerResult<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(key)
            .ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))?;
        apply_profile(account, profile);
        Ok(())
    }

    async fn entries(&self, key: &str, limit: i64) -> LedgerResult<Vec<LedgerEntry>> {
        let inner = self.lock();
        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| e.player_key == key)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn authenticated_accounts(&self, limit: i64) -> LedgerResult<Vec<PlayerAccount>> {
        let inner = self.lock();
        let mut accounts: Vec<PlayerAccount> = inner
            .accounts
            .values()
            .filter(|a| a.is_authenticated)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.chips.cmp(&a.chips));
        accounts.truncate(limit.max(0) as usize);
        Ok(accounts)
    }

    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}
