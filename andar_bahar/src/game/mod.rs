//! Core game logic: entities, the live round, and payout arithmetic.

pub mod constants;
pub mod entities;
pub mod round;

pub use entities::{Card, CardColor, Chips, DrawnCard, Rank, Side, Suit};
pub use round::{Phase, Pots, Round, RoundSnapshot, payout};
