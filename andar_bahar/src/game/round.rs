//! The single live round: phase, joker, draw sequence, and pots.
//!
//! `Round` is a plain data structure mutated exclusively by the table actor;
//! everything outside the actor only ever sees serialized [`RoundSnapshot`]s.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::constants::{PAYOUT_DENOMINATOR, PAYOUT_NUMERATOR};
use super::entities::{Card, Chips, DrawnCard, Side};

/// Round phase. Transitions only ever run
/// `lobby -> playing -> results -> lobby`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Playing,
    Results,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lobby => write!(f, "lobby"),
            Phase::Playing => write!(f, "playing"),
            Phase::Results => write!(f, "results"),
        }
    }
}

/// Per-side wager totals for the current round.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pots {
    pub andar: Chips,
    pub bahar: Chips,
}

impl Pots {
    pub fn add(&mut self, side: Side, amount: Chips) {
        match side {
            Side::Andar => self.andar += amount,
            Side::Bahar => self.bahar += amount,
        }
    }

    pub fn total(&self) -> Chips {
        self.andar + self.bahar
    }
}

/// Payout for a winning bet: floor(amount x 1.9), in integer arithmetic.
/// Losing bets pay nothing; the stake was already debited at acceptance.
pub fn payout(amount: Chips) -> Chips {
    amount * PAYOUT_NUMERATOR / PAYOUT_DENOMINATOR
}

/// The one live round. Single-writer: only the table actor mutates this.
#[derive(Debug)]
pub struct Round {
    sequence: u64,
    phase: Phase,
    joker: Card,
    drawn: Vec<DrawnCard>,
    winner: Option<Side>,
    next_side: Side,
    pots: Pots,
    countdown: u32,
    last_winner: Option<Side>,
    last_joker: Option<Card>,
}

impl Round {
    /// Open the first round in the lobby phase with a fresh joker.
    pub fn new(lobby_seconds: u32, rng: &mut impl Rng) -> Self {
        Self {
            sequence: 1,
            phase: Phase::Lobby,
            joker: Card::random(rng),
            drawn: Vec::new(),
            winner: None,
            next_side: Side::Andar,
            pots: Pots::default(),
            countdown: lobby_seconds,
            last_winner: None,
            last_joker: None,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn joker(&self) -> Card {
        self.joker
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn pots(&self) -> Pots {
        self.pots
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn drawn(&self) -> &[DrawnCard] {
        &self.drawn
    }

    /// Decrement the lobby countdown by one second, saturating at zero.
    /// Returns the seconds remaining.
    pub fn tick_countdown(&mut self) -> u32 {
        debug_assert_eq!(self.phase, Phase::Lobby);
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown
    }

    /// Record an accepted wager in the side's pot. The caller has already
    /// debited the amount from the bettor's balance.
    pub fn add_bet(&mut self, side: Side, amount: Chips) {
        debug_assert_eq!(self.phase, Phase::Lobby);
        self.pots.add(side, amount);
    }

    /// Close betting and enter the playing phase. The first card always
    /// goes to andar.
    pub fn begin_play(&mut self) {
        debug_assert_eq!(self.phase, Phase::Lobby);
        self.phase = Phase::Playing;
        self.next_side = Side::Andar;
        self.drawn.clear();
    }

    /// Draw one random card to the current target side.
    pub fn draw(&mut self, rng: &mut impl Rng) -> DrawnCard {
        self.apply_draw(Card::random(rng))
    }

    /// Apply one drawn card to the current target side. A rank match with
    /// the joker fixes the winner and moves the round to results; otherwise
    /// the target side flips for the next draw.
    pub fn apply_draw(&mut self, card: Card) -> DrawnCard {
        debug_assert_eq!(self.phase, Phase::Playing);
        let drawn = DrawnCard {
            card,
            side: self.next_side,
            is_match: card.rank == self.joker.rank,
        };
        self.drawn.push(drawn);
        if drawn.is_match {
            self.winner = Some(drawn.side);
            self.phase = Phase::Results;
        } else {
            self.next_side = self.next_side.other();
        }
        drawn
    }

    /// Reset in place for the next cycle: remember the finished round's
    /// winner and joker, draw a fresh joker, clear the card sequence and
    /// pots, and bump the sequence number.
    pub fn reset_for_next(&mut self, lobby_seconds: u32, rng: &mut impl Rng) {
        debug_assert_eq!(self.phase, Phase::Results);
        self.last_winner = self.winner;
        self.last_joker = Some(self.joker);
        self.sequence += 1;
        self.phase = Phase::Lobby;
        self.joker = Card::random(rng);
        self.drawn.clear();
        self.winner = None;
        self.next_side = Side::Andar;
        self.pots = Pots::default();
        self.countdown = lobby_seconds;
    }

    /// Read-only snapshot for broadcast; the round itself never leaves
    /// the actor.
    pub fn snapshot(&self, players_online: usize) -> RoundSnapshot {
        RoundSnapshot {
            phase: self.phase,
            sequence: self.sequence,
            joker: self.joker,
            drawn_cards: self.drawn.clone(),
            pots: self.pots,
            winner: self.winner,
            countdown: self.countdown,
            players_online,
            last_winner: self.last_winner,
            last_joker: self.last_joker,
        }
    }
}

/// Serializable view of the live round, sent to every attached connection.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoundSnapshot {
    pub phase: Phase,
    pub sequence: u64,
    pub joker: Card,
    pub drawn_cards: Vec<DrawnCard>,
    pub pots: Pots,
    pub winner: Option<Side>,
    pub countdown: u32,
    pub players_online: usize,
    pub last_winner: Option<Side>,
    pub last_joker: Option<Card>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn countdown_reaches_zero_and_saturates() {
        let mut rng = rng();
        let mut round = Round::new(3, &mut rng);
        assert_eq!(round.tick_countdown(), 2);
        assert_eq!(round.tick_countdown(), 1);
        assert_eq!(round.tick_countdown(), 0);
        assert_eq!(round.tick_countdown(), 0);
    }

    #[test]
    fn draws_alternate_starting_with_andar() {
        let mut rng = rng();
        let mut round = Round::new(30, &mut rng);
        round.begin_play();

        let mut expected = Side::Andar;
        for _ in 0..200 {
            let drawn = round.draw(&mut rng);
            assert_eq!(drawn.side, expected);
            if drawn.is_match {
                break;
            }
            expected = expected.other();
        }
    }

    #[test]
    fn exactly_one_match_terminates_the_draw_phase() {
        // Across many seeded rounds: no pre-match card shares the joker's
        // rank, the last card does, and the winner is the last card's side.
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut round = Round::new(30, &mut rng);
            round.begin_play();

            loop {
                let drawn = round.draw(&mut rng);
                if drawn.is_match {
                    break;
                }
                assert_eq!(round.phase(), Phase::Playing);
            }

            assert_eq!(round.phase(), Phase::Results);
            let drawn = round.drawn();
            let (last, earlier) = drawn.split_last().expect("at least one draw");
            assert!(last.is_match);
            assert_eq!(last.card.rank, round.joker().rank);
            assert_eq!(round.winner(), Some(last.side));
            assert!(
                earlier.iter().all(|d| d.card.rank != round.joker().rank),
                "no card before the match may share the joker's rank"
            );
            assert_eq!(
                drawn.iter().filter(|d| d.is_match).count(),
                1,
                "exactly one match per round"
            );
        }
    }

    #[test]
    fn pots_accumulate_per_side() {
        let mut rng = rng();
        let mut round = Round::new(30, &mut rng);
        round.add_bet(Side::Andar, 100);
        round.add_bet(Side::Bahar, 50);
        round.add_bet(Side::Andar, 25);
        assert_eq!(round.pots(), Pots { andar: 125, bahar: 50 });
        assert_eq!(round.pots().total(), 175);
    }

    #[test]
    fn payout_is_floor_of_one_point_nine() {
        assert_eq!(payout(100), 190);
        assert_eq!(payout(50), 95);
        assert_eq!(payout(1), 1); // floor(1.9)
        assert_eq!(payout(33), 62); // floor(62.7)
        assert_eq!(payout(0), 0);
    }

    #[test]
    fn reset_rolls_the_sequence_and_remembers_the_outcome() {
        let mut rng = rng();
        let mut round = Round::new(30, &mut rng);
        let first_joker = round.joker();
        round.add_bet(Side::Bahar, 10);
        round.begin_play();
        while !round.draw(&mut rng).is_match {}
        let winner = round.winner();
        assert!(winner.is_some());

        round.reset_for_next(30, &mut rng);
        assert_eq!(round.sequence(), 2);
        assert_eq!(round.phase(), Phase::Lobby);
        assert_eq!(round.winner(), None);
        assert!(round.drawn().is_empty());
        assert_eq!(round.pots(), Pots::default());
        assert_eq!(round.countdown(), 30);
        assert_eq!(round.snapshot(0).last_winner, winner);
        assert_eq!(round.snapshot(0).last_joker, Some(first_joker));
    }

    #[test]
    fn seven_of_hearts_on_the_third_draw_wins_for_andar() {
        use crate::game::entities::{Rank, Suit};

        let mut rng = rng();
        let mut round = Round::new(30, &mut rng);
        round.joker = Card::new(Rank::Seven, Suit::Clubs);
        round.add_bet(Side::Andar, 100);
        round.add_bet(Side::Bahar, 50);
        round.begin_play();

        let first = round.apply_draw(Card::new(Rank::Ace, Suit::Spades));
        assert_eq!((first.side, first.is_match), (Side::Andar, false));

        let second = round.apply_draw(Card::new(Rank::King, Suit::Diamonds));
        assert_eq!((second.side, second.is_match), (Side::Bahar, false));

        let third = round.apply_draw(Card::new(Rank::Seven, Suit::Hearts));
        assert_eq!((third.side, third.is_match), (Side::Andar, true));

        assert_eq!(round.phase(), Phase::Results);
        assert_eq!(round.winner(), Some(Side::Andar));
        assert_eq!(round.drawn().len(), 3);

        // The 100-chip andar bet pays floor(100 x 1.9) = 190; the 50-chip
        // bahar bet is on the losing side and pays nothing.
        assert_eq!(payout(100), 190);
    }

    #[test]
    fn snapshot_reflects_live_state() {
        let mut rng = rng();
        let mut round = Round::new(30, &mut rng);
        round.add_bet(Side::Andar, 100);

        let snapshot = round.snapshot(3);
        assert_eq!(snapshot.phase, Phase::Lobby);
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.pots.andar, 100);
        assert_eq!(snapshot.players_online, 3);
        assert_eq!(snapshot.winner, None);
    }
}
