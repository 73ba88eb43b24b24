//! Game-economics constants.

use super::entities::Chips;

/// Seconds the betting lobby stays open each round.
pub const DEFAULT_LOBBY_SECONDS: u32 = 30;

/// Milliseconds between card draws during the playing phase.
pub const DEFAULT_DRAW_INTERVAL_MS: u64 = 1200;

/// Seconds the results phase lingers before the next lobby opens.
pub const DEFAULT_SETTLE_SECONDS: u64 = 5;

/// Winning bets pay `amount * PAYOUT_NUMERATOR / PAYOUT_DENOMINATOR`,
/// i.e. floor(amount x 1.9). A fixed economics constant, not computed odds.
pub const PAYOUT_NUMERATOR: Chips = 19;
pub const PAYOUT_DENOMINATOR: Chips = 10;

/// Chips granted when an authenticated account is created.
/// Anonymous (locally-generated) accounts start empty.
pub const SIGNUP_GRANT: Chips = 1000;
