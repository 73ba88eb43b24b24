//! The round orchestrator actor.
//!
//! A single tokio task owns the live [`Round`] and the in-round
//! [`BetBook`]; every inbox message and timer tick is handled to completion
//! before the next, so round state needs no locking and all connections
//! observe phase transitions and card draws in one global order. The only
//! suspension points are ledger and history store calls, and the actor
//! never advances past a phase whose persistence is unconfirmed.

use super::bets::{Bet, BetBook};
use super::config::TableConfig;
use super::messages::{
    Attached, BetAck, ClaimAck, ConnectionId, ServerEvent, TableError, TableMessage,
};
use crate::game::{Chips, Phase, Round, RoundSnapshot, Side, payout};
use crate::history::{HistoryStore, PlayerOutcome, RoundRecord};
use crate::identity::{Profile, is_authenticated_key, is_local_key};
use crate::ledger::{EntryReason, LedgerError, LedgerStore};
use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use std::collections::HashMap;
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, Sleep, interval_at};

/// Delay between retries of a failed payout credit or history append.
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The one scheduled task driving the current phase. Replacing the value
/// on a phase transition drops the previous timer, which cancels any tick
/// already scheduled for the old phase.
enum PhaseTimer {
    /// One tick per second while the lobby countdown runs.
    Lobby(Interval),
    /// One tick per draw interval while cards are dealt.
    Draw(Interval),
    /// One shot after the settle delay in results.
    Settle(Pin<Box<Sleep>>),
    /// No scheduled work; the round is held in place.
    Idle,
}

impl PhaseTimer {
    fn lobby() -> Self {
        let period = Duration::from_secs(1);
        PhaseTimer::Lobby(interval_at(Instant::now() + period, period))
    }

    fn draw(period: Duration) -> Self {
        PhaseTimer::Draw(interval_at(Instant::now() + period, period))
    }

    fn settle(delay: Duration) -> Self {
        PhaseTimer::Settle(Box::pin(tokio::time::sleep(delay)))
    }

    async fn fired(&mut self) {
        match self {
            PhaseTimer::Lobby(interval) | PhaseTimer::Draw(interval) => {
                interval.tick().await;
            }
            PhaseTimer::Settle(sleep) => sleep.as_mut().await,
            PhaseTimer::Idle => future::pending().await,
        }
    }
}

/// Handle for sending messages to the round actor.
#[derive(Clone)]
pub struct RoundHandle {
    sender: mpsc::Sender<TableMessage>,
}

impl RoundHandle {
    /// Send a raw message to the actor.
    pub async fn send(&self, message: TableMessage) -> Result<(), TableError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TableError::TableClosed)
    }

    /// Attach a connection under an identity key. Returns the current
    /// balance and a full round snapshot.
    pub async fn attach(
        &self,
        conn_id: ConnectionId,
        key: String,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<Attached, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::Attach {
            conn_id,
            key,
            events,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| TableError::TableClosed)?
    }

    pub async fn place_bet(
        &self,
        conn_id: ConnectionId,
        side: Side,
        amount: Chips,
    ) -> Result<BetAck, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::PlaceBet {
            conn_id,
            side,
            amount,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| TableError::TableClosed)?
    }

    pub async fn balance(&self, conn_id: ConnectionId) -> Result<Chips, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::RequestBalance {
            conn_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| TableError::TableClosed)?
    }

    pub async fn claim_identity(
        &self,
        conn_id: ConnectionId,
        key: String,
        profile: Profile,
    ) -> Result<ClaimAck, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::ClaimIdentity {
            conn_id,
            key,
            profile,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| TableError::TableClosed)?
    }

    pub async fn detach(&self, conn_id: ConnectionId) -> Result<(), TableError> {
        self.send(TableMessage::Detach { conn_id }).await
    }

    pub async fn snapshot(&self) -> Result<RoundSnapshot, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::GetSnapshot { response: tx }).await?;
        rx.await.map_err(|_| TableError::TableClosed)
    }
}

struct Connection {
    key: String,
    events: mpsc::Sender<ServerEvent>,
}

/// Round orchestrator: owns the live round, the bet book, and the
/// connection registry.
pub struct RoundActor {
    config: TableConfig,
    round: Round,
    bets: BetBook,
    inbox: mpsc::Receiver<TableMessage>,
    ledger: Arc<dyn LedgerStore>,
    history: Arc<dyn HistoryStore>,
    connections: HashMap<ConnectionId, Connection>,
    timer: PhaseTimer,
    rng: StdRng,
}

impl RoundActor {
    /// Create the actor and a handle for sending messages to it.
    pub fn new(
        config: TableConfig,
        ledger: Arc<dyn LedgerStore>,
        history: Arc<dyn HistoryStore>,
    ) -> (Self, RoundHandle) {
        let (sender, inbox) = mpsc::channel(100);
        let mut rng = StdRng::from_os_rng();

        let actor = Self {
            round: Round::new(config.lobby_seconds, &mut rng),
            config,
            bets: BetBook::new(),
            inbox,
            ledger,
            history,
            connections: HashMap::new(),
            timer: PhaseTimer::lobby(),
            rng,
        };

        (actor, RoundHandle { sender })
    }

    /// Run the actor event loop until every handle is dropped.
    pub async fn run(mut self) {
        log::info!(
            "table '{}' starting, round {} in lobby, joker {}",
            self.config.name,
            self.round.sequence(),
            self.round.joker()
        );

        loop {
            tokio::select! {
                maybe = self.inbox.recv() => match maybe {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                _ = self.timer.fired() => self.on_timer_fired().await,
            }
        }

        log::info!("table '{}' closed", self.config.name);
    }

    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Attach {
                conn_id,
                key,
                events,
                response,
            } => {
                let result = self.handle_attach(conn_id, key, events).await;
                let _ = response.send(result);
            }

            TableMessage::PlaceBet {
                conn_id,
                side,
                amount,
                response,
            } => {
                let result = self.handle_place_bet(conn_id, side, amount).await;
                let _ = response.send(result);
            }

            TableMessage::RequestBalance { conn_id, response } => {
                let result = self.handle_request_balance(conn_id).await;
                let _ = response.send(result);
            }

            TableMessage::ClaimIdentity {
                conn_id,
                key,
                profile,
                response,
            } => {
                let result = self.handle_claim_identity(conn_id, key, profile).await;
                let _ = response.send(result);
            }

            TableMessage::Detach { conn_id } => {
                self.handle_detach(conn_id);
            }

            TableMessage::GetSnapshot { response } => {
                let _ = response.send(self.round.snapshot(self.connections.len()));
            }
        }
    }

    async fn on_timer_fired(&mut self) {
        match self.round.phase() {
            Phase::Lobby => self.on_countdown_tick().await,
            Phase::Playing => self.on_draw_tick().await,
            Phase::Results => self.on_settle_elapsed(),
        }
    }

    async fn handle_attach(
        &mut self,
        conn_id: ConnectionId,
        key: String,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<Attached, TableError> {
        let account = self.ledger.get_or_create(&key).await?;
        self.connections.insert(conn_id, Connection { key, events });

        log::debug!(
            "connection {} attached as {} ({} online)",
            conn_id,
            account.key,
            self.connections.len()
        );

        let snapshot = self.round.snapshot(self.connections.len());
        // Presence count changed for everyone else too.
        self.broadcast_round_state();

        Ok(Attached {
            balance: account.chips,
            snapshot,
        })
    }

    async fn handle_place_bet(
        &mut self,
        conn_id: ConnectionId,
        side: Side,
        amount: Chips,
    ) -> Result<BetAck, TableError> {
        let key = self
            .connections
            .get(&conn_id)
            .ok_or(TableError::UnknownConnection)?
            .key
            .clone();

        // The phase gate is authoritative: a bet that raced a phase
        // transition on the wire is rejected here regardless of what the
        // client had seen.
        if self.round.phase() != Phase::Lobby {
            return Err(TableError::BetClosed);
        }
        if amount <= 0 {
            return Err(TableError::InvalidAmount(amount));
        }
        if self.bets.contains(&key) {
            return Err(TableError::DuplicateBet);
        }

        // Debit first, and only record the bet once the store confirmed
        // it: a bet record without its debit must never exist.
        let balance = self.ledger.debit(&key, amount, EntryReason::Bet).await?;

        self.bets.record(Bet {
            key: key.clone(),
            side,
            amount,
            conn_id: Some(conn_id),
            placed_at: Utc::now(),
        });
        self.round.add_bet(side, amount);

        let pots = self.round.pots();
        log::info!("{key} bet {amount} on {side} (round {})", self.round.sequence());
        self.broadcast(ServerEvent::PotUpdate { pots });

        Ok(BetAck {
            side,
            amount,
            balance,
            pots,
        })
    }

    async fn handle_request_balance(&mut self, conn_id: ConnectionId) -> Result<Chips, TableError> {
        let key = self
            .connections
            .get(&conn_id)
            .ok_or(TableError::UnknownConnection)?
            .key
            .clone();
        Ok(self.ledger.balance(&key).await?)
    }

    async fn handle_claim_identity(
        &mut self,
        conn_id: ConnectionId,
        key: String,
        profile: Profile,
    ) -> Result<ClaimAck, TableError> {
        let old_key = self
            .connections
            .get(&conn_id)
            .ok_or(TableError::UnknownConnection)?
            .key
            .clone();

        if !is_authenticated_key(&key) {
            return Err(TableError::UnauthenticatedKey);
        }

        let balance = if old_key != key && is_local_key(&old_key) {
            // Merge the anonymous session into the claimed identity in a
            // single store transaction, then move its in-round bet so a
            // payout can't target the deleted key. Both happen inside this
            // handler, so the merge can never interleave with payout
            // processing.
            let balance = self.ledger.merge_accounts(&old_key, &key, &profile).await?;
            if self.bets.reattribute(&old_key, &key) {
                log::info!("re-attributed in-round bet from {old_key} to {key}");
            }
            log::info!("merged {old_key} into {key}, balance {balance}");
            balance
        } else {
            let account = self.ledger.get_or_create(&key).await?;
            if !profile.is_empty() {
                self.ledger.update_profile(&key, &profile).await?;
            }
            account.chips
        };

        if let Some(connection) = self.connections.get_mut(&conn_id) {
            connection.key = key.clone();
        }

        Ok(ClaimAck { key, balance })
    }

    fn handle_detach(&mut self, conn_id: ConnectionId) {
        if self.connections.remove(&conn_id).is_some() {
            // The connection index goes; an accepted bet stays funded and
            // in play.
            self.bets.release_connection(conn_id);
            log::debug!(
                "connection {} detached ({} online)",
                conn_id,
                self.connections.len()
            );
            self.broadcast_round_state();
        }
    }

    async fn on_countdown_tick(&mut self) {
        let seconds_left = self.round.tick_countdown();
        self.broadcast(ServerEvent::CountdownTick { seconds_left });
        if seconds_left == 0 {
            self.begin_play();
        }
    }

    fn begin_play(&mut self) {
        self.round.begin_play();
        self.timer = PhaseTimer::draw(self.config.draw_interval());
        log::info!(
            "round {} playing, joker {}, pots {}/{}",
            self.round.sequence(),
            self.round.joker(),
            self.round.pots().andar,
            self.round.pots().bahar
        );
        self.broadcast_round_state();
    }

    async fn on_draw_tick(&mut self) {
        let drawn = self.round.draw(&mut self.rng);
        self.broadcast(ServerEvent::CardDrawn(drawn));
        if drawn.is_match {
            // Drop the draw timer before anything can suspend, so a tick
            // already scheduled for the next interval can never land.
            self.timer = PhaseTimer::Idle;
            self.finish_round().await;
        }
    }

    /// Results entry: settle winning bets, archive the round, announce the
    /// outcome, and only then start the settle timer. Persistence failures
    /// hold the round in place and retry; they are never dropped.
    async fn finish_round(&mut self) {
        let Some(winner) = self.round.winner() else {
            return;
        };

        log::info!(
            "round {} finished after {} cards, winner {winner}",
            self.round.sequence(),
            self.round.drawn().len()
        );
        self.broadcast_round_state();

        let payouts = self.settle_winning_bets(winner).await;
        self.archive_round(winner).await;

        self.broadcast(ServerEvent::RoundComplete {
            winner,
            total_cards: self.round.drawn().len(),
            payouts,
        });

        self.timer = PhaseTimer::settle(self.config.settle_delay());
    }

    /// Credit floor(amount x 1.9) to every winning bet. Each credit is
    /// applied exactly once; failed credits are retried until the store
    /// confirms them.
    async fn settle_winning_bets(&mut self, winner: Side) -> HashMap<ConnectionId, Chips> {
        let mut pending: Vec<(String, Option<ConnectionId>, Chips)> = self
            .bets
            .iter()
            .filter(|bet| bet.side == winner)
            .map(|bet| (bet.key.clone(), bet.conn_id, payout(bet.amount)))
            .collect();

        let mut payouts = HashMap::new();

        while !pending.is_empty() {
            let mut unconfirmed = Vec::new();

            for (key, conn_id, amount) in pending {
                match self.ledger.credit(&key, amount, EntryReason::Payout).await {
                    Ok(balance) => {
                        if let Some(conn_id) = conn_id {
                            payouts.insert(conn_id, amount);
                            self.send_to(conn_id, ServerEvent::BalanceChanged { balance });
                        }
                    }
                    Err(LedgerError::Database(e)) => {
                        log::error!("payout credit for {key} failed, will retry: {e}");
                        unconfirmed.push((key, conn_id, amount));
                    }
                    Err(e) => {
                        // Not a store outage; retrying can't fix it.
                        log::error!("payout credit for {key} rejected: {e}");
                    }
                }
            }

            pending = unconfirmed;
            if !pending.is_empty() {
                tokio::time::sleep(PERSIST_RETRY_DELAY).await;
            }
        }

        payouts
    }

    /// Append the finished round to the history store, retrying until the
    /// append is confirmed. Rounds with no bets are archived with an empty
    /// player list.
    async fn archive_round(&mut self, winner: Side) {
        let record = RoundRecord {
            sequence: self.round.sequence(),
            joker: self.round.joker(),
            winner,
            drawn_cards: self.round.drawn().to_vec(),
            pot_andar: self.round.pots().andar,
            pot_bahar: self.round.pots().bahar,
            players: self
                .bets
                .iter()
                .map(|bet| PlayerOutcome {
                    key: bet.key.clone(),
                    side: bet.side,
                    amount: bet.amount,
                    won: bet.side == winner,
                    payout: if bet.side == winner { payout(bet.amount) } else { 0 },
                })
                .collect(),
            finished_at: Utc::now(),
        };

        while let Err(e) = self.history.append(&record).await {
            log::error!(
                "archiving round {} failed, will retry: {e}",
                record.sequence
            );
            tokio::time::sleep(PERSIST_RETRY_DELAY).await;
        }
    }

    fn on_settle_elapsed(&mut self) {
        self.round
            .reset_for_next(self.config.lobby_seconds, &mut self.rng);
        self.bets.clear();
        self.timer = PhaseTimer::lobby();
        log::info!(
            "round {} lobby open, joker {}",
            self.round.sequence(),
            self.round.joker()
        );
        self.broadcast_round_state();
    }

    fn broadcast_round_state(&mut self) {
        let snapshot = self.round.snapshot(self.connections.len());
        self.broadcast(ServerEvent::RoundState(snapshot));
    }

    /// Fan an event out to every attached connection, evicting the dead
    /// ones. A full queue drops the event for that connection only; the
    /// next snapshot will catch it up.
    fn broadcast(&mut self, event: ServerEvent) {
        self.connections.retain(|conn_id, connection| {
            match connection.events.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("connection {conn_id} event queue full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("connection {conn_id} gone, evicting");
                    false
                }
            }
        });
    }

    fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&conn_id) {
            let _ = connection.events.try_send(event);
        }
    }
}
