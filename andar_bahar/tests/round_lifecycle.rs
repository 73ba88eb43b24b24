//! End-to-end round lifecycle tests driving the actor through its handle,
//! with in-memory stores and paused tokio time so the full
//! lobby -> playing -> results -> lobby cycle runs in virtual time.

use std::sync::Arc;
use std::time::Duration;

use andar_bahar::game::{Chips, Phase, Side};
use andar_bahar::history::{HistoryStore, MemoryHistoryStore};
use andar_bahar::ledger::{LedgerError, LedgerStore, MemoryLedgerStore};
use andar_bahar::table::{ConnectionId, RoundActor, RoundHandle, ServerEvent, TableConfig, TableError};
use tokio::sync::mpsc;
use uuid::Uuid;

const GRANT: Chips = 1000;

fn fast_config() -> TableConfig {
    TableConfig {
        name: "Test Table".to_string(),
        lobby_seconds: 3,
        draw_interval_ms: 100,
        settle_seconds: 1,
    }
}

fn spawn_table(
    config: TableConfig,
) -> (RoundHandle, Arc<MemoryLedgerStore>, Arc<MemoryHistoryStore>) {
    let ledger = Arc::new(MemoryLedgerStore::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let (actor, handle) = RoundActor::new(config, ledger.clone(), history.clone());
    tokio::spawn(actor.run());
    (handle, ledger, history)
}

async fn attach(
    handle: &RoundHandle,
    key: &str,
) -> (ConnectionId, mpsc::Receiver<ServerEvent>, Chips) {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(1024);
    let attached = handle
        .attach(conn_id, key.to_string(), tx)
        .await
        .expect("attach should succeed");
    (conn_id, rx, attached.balance)
}

/// Drain events until the predicate matches, bounded in virtual time.
async fn wait_for<F>(rx: &mut mpsc::Receiver<ServerEvent>, mut predicate: F) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event = rx.recv().await.expect("event stream ended");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

fn is_round_complete(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::RoundComplete { .. })
}

/// Collect every event up to and including the round completion.
async fn collect_until_complete(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    tokio::time::timeout(Duration::from_secs(600), async {
        let mut events = Vec::new();
        loop {
            let event = rx.recv().await.expect("event stream ended");
            let done = is_round_complete(&event);
            events.push(event);
            if done {
                return events;
            }
        }
    })
    .await
    .expect("round never completed")
}

#[tokio::test(start_paused = true)]
async fn attach_returns_balance_and_lobby_snapshot() {
    let (handle, _ledger, _history) = spawn_table(fast_config());

    let conn_id = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(64);
    let attached = handle.attach(conn_id, "111".to_string(), tx).await.unwrap();

    assert_eq!(attached.balance, GRANT, "authenticated key gets the signup grant");
    assert_eq!(attached.snapshot.phase, Phase::Lobby);
    assert_eq!(attached.snapshot.sequence, 1);
    assert_eq!(attached.snapshot.players_online, 1);
    assert!(attached.snapshot.drawn_cards.is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_round_cycle_settles_bets_and_reopens_the_lobby() {
    let (handle, ledger, history) = spawn_table(fast_config());

    let (alice, mut alice_rx, _) = attach(&handle, "111").await;
    let (bob, _bob_rx, _) = attach(&handle, "222").await;

    let ack = handle.place_bet(alice, Side::Andar, 100).await.unwrap();
    assert_eq!(ack.balance, GRANT - 100);
    assert_eq!(ack.pots.andar, 100);

    let ack = handle.place_bet(bob, Side::Bahar, 50).await.unwrap();
    assert_eq!(ack.balance, GRANT - 50);
    assert_eq!(ack.pots.bahar, 50);
    assert_eq!(ack.pots.total(), 150);

    let complete = wait_for(&mut alice_rx, is_round_complete).await;
    let ServerEvent::RoundComplete { winner, total_cards, payouts } = complete else {
        unreachable!()
    };
    assert!(total_cards >= 1);

    // Whichever side won, exactly one bettor was paid floor(amount x 1.9)
    // and the other lost their stake.
    let alice_balance = ledger.balance("111").await.unwrap();
    let bob_balance = ledger.balance("222").await.unwrap();
    match winner {
        Side::Andar => {
            assert_eq!(alice_balance, GRANT - 100 + 190);
            assert_eq!(bob_balance, GRANT - 50);
            assert_eq!(payouts.get(&alice), Some(&190));
            assert!(!payouts.contains_key(&bob));
        }
        Side::Bahar => {
            assert_eq!(alice_balance, GRANT - 100);
            assert_eq!(bob_balance, GRANT - 50 + 95);
            assert_eq!(payouts.get(&bob), Some(&95));
            assert!(!payouts.contains_key(&alice));
        }
    }

    // The round was archived with both outcomes and conserved pots.
    let rounds = history.recent_rounds(10).await.unwrap();
    assert_eq!(rounds.len(), 1);
    let record = &rounds[0];
    assert_eq!(record.sequence, 1);
    assert_eq!(record.winner, winner);
    assert_eq!(record.pot_andar + record.pot_bahar, 150);
    assert_eq!(record.players.len(), 2);
    let won_count = record.players.iter().filter(|p| p.won).count();
    assert_eq!(won_count, 1);

    // After the settle delay the next lobby opens with cleared state.
    let state = wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::RoundState(s) if s.phase == Phase::Lobby && s.sequence == 2)
    })
    .await;
    let ServerEvent::RoundState(snapshot) = state else { unreachable!() };
    assert_eq!(snapshot.pots.total(), 0);
    assert!(snapshot.drawn_cards.is_empty());
    assert_eq!(snapshot.winner, None);
    assert_eq!(snapshot.last_winner, Some(winner));

    // And the same identity may bet again in the new round.
    let ack = handle.place_bet(alice, Side::Bahar, 10).await.unwrap();
    assert_eq!(ack.balance, alice_balance - 10);
}

#[tokio::test(start_paused = true)]
async fn duplicate_bet_is_rejected_and_the_first_stands() {
    let (handle, ledger, _history) = spawn_table(TableConfig::default());

    let (alice, _rx, _) = attach(&handle, "111").await;
    handle.place_bet(alice, Side::Andar, 100).await.unwrap();

    let err = handle.place_bet(alice, Side::Bahar, 25).await.unwrap_err();
    assert!(matches!(err, TableError::DuplicateBet));

    // Only the first wager was debited.
    assert_eq!(ledger.balance("111").await.unwrap(), GRANT - 100);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pots.andar, 100);
    assert_eq!(snapshot.pots.bahar, 0);
}

#[tokio::test(start_paused = true)]
async fn unfunded_and_invalid_bets_are_rejected() {
    let (handle, ledger, _history) = spawn_table(TableConfig::default());

    // Local (anonymous) keys start with zero chips.
    let (anon, _rx, balance) = attach(&handle, "u_broke").await;
    assert_eq!(balance, 0);

    let err = handle.place_bet(anon, Side::Andar, 50).await.unwrap_err();
    assert!(matches!(
        err,
        TableError::Ledger(LedgerError::InsufficientChips { available: 0, required: 50 })
    ));

    let err = handle.place_bet(anon, Side::Andar, 0).await.unwrap_err();
    assert!(matches!(err, TableError::InvalidAmount(0)));

    let err = handle.place_bet(anon, Side::Andar, -10).await.unwrap_err();
    assert!(matches!(err, TableError::InvalidAmount(-10)));

    // No mutation happened.
    assert_eq!(ledger.balance("u_broke").await.unwrap(), 0);
    assert!(handle.snapshot().await.unwrap().pots.total() == 0);
}

#[tokio::test(start_paused = true)]
async fn bets_are_refused_once_the_countdown_hits_zero() {
    let (handle, ledger, _history) = spawn_table(fast_config());

    let (alice, mut rx, _) = attach(&handle, "111").await;

    // The phase flips in the same handler that observes zero, so the gate
    // is authoritative no matter what the client saw.
    wait_for(&mut rx, |e| {
        matches!(e, ServerEvent::RoundState(s) if s.phase == Phase::Playing)
    })
    .await;

    let err = handle.place_bet(alice, Side::Andar, 100).await.unwrap_err();
    assert!(matches!(err, TableError::BetClosed));
    assert_eq!(ledger.balance("111").await.unwrap(), GRANT);
}

#[tokio::test(start_paused = true)]
async fn countdown_transitions_to_playing_exactly_once() {
    let (handle, _ledger, _history) = spawn_table(fast_config());
    let (_alice, mut rx, _) = attach(&handle, "111").await;

    let events = collect_until_complete(&mut rx).await;
    drop(handle);

    // The countdown ran down monotonically and the lobby -> playing flip
    // happened exactly once this round.
    let mut transitions = 0;
    let mut last_phase = Phase::Lobby;
    let mut last_tick = u32::MAX;
    for event in &events {
        match event {
            ServerEvent::RoundState(s) => {
                if last_phase == Phase::Lobby && s.phase == Phase::Playing {
                    transitions += 1;
                }
                last_phase = s.phase;
            }
            ServerEvent::CountdownTick { seconds_left } => {
                assert!(*seconds_left < last_tick);
                last_tick = *seconds_left;
            }
            _ => {}
        }
    }
    assert_eq!(transitions, 1);
}

#[tokio::test(start_paused = true)]
async fn disconnected_players_funded_bet_still_pays_out() {
    let (handle, ledger, history) = spawn_table(fast_config());

    let (alice, mut alice_rx, _) = attach(&handle, "111").await;
    let (bob, _bob_rx, _) = attach(&handle, "222").await;

    handle.place_bet(alice, Side::Andar, 100).await.unwrap();
    handle.place_bet(bob, Side::Bahar, 60).await.unwrap();

    // Bob leaves before the draw phase even starts. The debit stands and
    // the bet stays in play for the identity.
    handle.detach(bob).await.unwrap();

    let complete = wait_for(&mut alice_rx, is_round_complete).await;
    let ServerEvent::RoundComplete { winner, payouts, .. } = complete else {
        unreachable!()
    };

    let bob_balance = ledger.balance("222").await.unwrap();
    match winner {
        Side::Bahar => assert_eq!(bob_balance, GRANT - 60 + 114), // floor(60 x 1.9)
        Side::Andar => assert_eq!(bob_balance, GRANT - 60),
    }
    // Bob's connection is gone, so no payout is reported against it.
    assert!(!payouts.contains_key(&bob));

    // His outcome is still archived under his identity.
    let outcomes = history.outcomes_for_player("222", 10).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].amount, 60);
    assert_eq!(outcomes[0].won, winner == Side::Bahar);
}

#[tokio::test(start_paused = true)]
async fn rounds_with_no_bets_still_run_and_are_archived() {
    let (handle, _ledger, history) = spawn_table(fast_config());
    let (_alice, mut rx, _) = attach(&handle, "111").await;

    wait_for(&mut rx, is_round_complete).await;
    wait_for(&mut rx, |e| {
        matches!(e, ServerEvent::RoundState(s) if s.phase == Phase::Lobby && s.sequence == 2)
    })
    .await;

    let rounds = history.recent_rounds(10).await.unwrap();
    assert_eq!(rounds.len(), 1);
    assert!(rounds[0].players.is_empty());
    assert_eq!(rounds[0].pot_andar + rounds[0].pot_bahar, 0);
}

#[tokio::test(start_paused = true)]
async fn card_draws_are_observed_in_generation_order() {
    let (handle, _ledger, _history) = spawn_table(fast_config());
    let (_alice, mut rx, _) = attach(&handle, "111").await;

    let events = collect_until_complete(&mut rx).await;
    drop(handle);

    let mut expected = Side::Andar;
    let mut draws = 0;
    let mut saw_match = false;
    for event in &events {
        if let ServerEvent::CardDrawn(drawn) = event {
            assert!(!saw_match, "no draw may follow the match");
            assert_eq!(drawn.side, expected, "sides must alternate from andar");
            draws += 1;
            saw_match = drawn.is_match;
            expected = expected.other();
        }
    }
    assert!(draws >= 1);
    assert!(saw_match, "the round must end on a match");
}
