//! Statistics derived from round history.
//!
//! All computations take a player's outcomes ordered newest-first, the way
//! the store returns them. Rounds where the player wagered nothing are
//! no-ops: they neither count as games played nor break a win streak.

use serde::{Deserialize, Serialize};

use super::models::PlayerOutcome;
use crate::game::Chips;
use crate::ledger::PlayerAccount;

/// Aggregate statistics for one player.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerStats {
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    /// Percentage of games won, rounded to the nearest integer.
    pub win_rate: u32,
    /// Consecutive wins counted from the most recent game back to the
    /// first loss.
    pub current_streak: u32,
    pub max_streak: u32,
    pub chips: Chips,
    pub total_earned: Chips,
    pub total_lost: Chips,
}

/// Compute statistics from outcomes ordered newest-first.
pub fn compute(outcomes_newest_first: &[PlayerOutcome], chips: Chips) -> PlayerStats {
    let mut stats = PlayerStats {
        chips,
        ..PlayerStats::default()
    };

    let mut run = 0u32;
    let mut streak_open = true;
    for outcome in outcomes_newest_first.iter().filter(|o| o.amount > 0) {
        stats.games_played += 1;
        if outcome.won {
            stats.wins += 1;
            stats.total_earned += outcome.payout;
            run += 1;
            stats.max_streak = stats.max_streak.max(run);
            if streak_open {
                stats.current_streak += 1;
            }
        } else {
            stats.total_lost += outcome.amount;
            run = 0;
            streak_open = false;
        }
    }

    stats.losses = stats.games_played - stats.wins;
    if stats.games_played > 0 {
        stats.win_rate =
            ((stats.wins as f64 / stats.games_played as f64) * 100.0).round() as u32;
    }

    stats
}

/// Leaderboard orderings.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardOrder {
    Chips,
    Wins,
    WinRate,
    Streak,
}

impl std::str::FromStr for LeaderboardOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chips" => Ok(LeaderboardOrder::Chips),
            "wins" => Ok(LeaderboardOrder::Wins),
            "win_rate" => Ok(LeaderboardOrder::WinRate),
            "streak" => Ok(LeaderboardOrder::Streak),
            other => Err(format!("unknown leaderboard order: {other}")),
        }
    }
}

/// One leaderboard row: account identity plus derived statistics.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardRow {
    pub key: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub stats: PlayerStats,
}

impl LeaderboardRow {
    pub fn new(account: &PlayerAccount, stats: PlayerStats) -> Self {
        let username = account
            .profile
            .username
            .clone()
            .or_else(|| account.profile.display_name.clone())
            .unwrap_or_else(|| format!("Player {}", account.key));
        Self {
            key: account.key.clone(),
            username,
            display_name: account.profile.display_name.clone(),
            avatar_url: account.profile.avatar_url.clone(),
            stats,
        }
    }
}

/// Order rows for a leaderboard view and truncate to `limit`. Orderings
/// other than chips only list players with at least one game.
pub fn rank(mut rows: Vec<LeaderboardRow>, order: LeaderboardOrder, limit: usize) -> Vec<LeaderboardRow> {
    match order {
        LeaderboardOrder::Chips => rows.sort_by(|a, b| b.stats.chips.cmp(&a.stats.chips)),
        LeaderboardOrder::Wins => rows.sort_by(|a, b| b.stats.wins.cmp(&a.stats.wins)),
        LeaderboardOrder::WinRate => rows.sort_by(|a, b| b.stats.win_rate.cmp(&a.stats.win_rate)),
        LeaderboardOrder::Streak => rows.sort_by(|a, b| b.stats.max_streak.cmp(&a.stats.max_streak)),
    }
    if order != LeaderboardOrder::Chips {
        rows.retain(|r| r.stats.games_played > 0);
    }
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Side;

    fn outcome(amount: Chips, won: bool) -> PlayerOutcome {
        PlayerOutcome {
            key: "1".to_string(),
            side: Side::Andar,
            amount,
            won,
            payout: if won { amount * 19 / 10 } else { 0 },
        }
    }

    #[test]
    fn empty_history_yields_zeroes() {
        let stats = compute(&[], 500);
        assert_eq!(stats, PlayerStats { chips: 500, ..PlayerStats::default() });
    }

    #[test]
    fn current_streak_stops_at_first_loss() {
        // Newest first: win, win, loss, win.
        let outcomes = vec![
            outcome(100, true),
            outcome(100, true),
            outcome(100, false),
            outcome(100, true),
        ];
        let stats = compute(&outcomes, 0);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.games_played, 4);
        assert_eq!(stats.wins, 3);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.win_rate, 75);
    }

    #[test]
    fn zero_amount_rounds_are_no_ops_for_streaks() {
        // A zero-wager entry between wins must not break the streak and
        // must not count as a game.
        let outcomes = vec![
            outcome(100, true),
            outcome(0, false),
            outcome(100, true),
            outcome(100, false),
        ];
        let stats = compute(&outcomes, 0);
        assert_eq!(stats.games_played, 3);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.max_streak, 2);
    }

    #[test]
    fn max_streak_can_exceed_current() {
        // Newest first: loss, then three older consecutive wins.
        let outcomes = vec![
            outcome(10, false),
            outcome(10, true),
            outcome(10, true),
            outcome(10, true),
        ];
        let stats = compute(&outcomes, 0);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 3);
    }

    #[test]
    fn totals_track_payouts_and_stakes() {
        let outcomes = vec![outcome(100, true), outcome(40, false)];
        let stats = compute(&outcomes, 0);
        assert_eq!(stats.total_earned, 190);
        assert_eq!(stats.total_lost, 40);
    }

    #[test]
    fn rank_orders_and_filters() {
        let account = |key: &str, chips: Chips| PlayerAccount {
            key: key.to_string(),
            chips,
            is_authenticated: true,
            profile: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let idle = LeaderboardRow::new(&account("1", 5000), compute(&[], 5000));
        let active = LeaderboardRow::new(
            &account("2", 100),
            compute(&[outcome(50, true)], 100),
        );

        let by_chips = rank(vec![idle.clone(), active.clone()], LeaderboardOrder::Chips, 10);
        assert_eq!(by_chips[0].key, "1");
        assert_eq!(by_chips.len(), 2);

        // Non-chip orderings drop players with no games.
        let by_wins = rank(vec![idle, active], LeaderboardOrder::Wins, 10);
        assert_eq!(by_wins.len(), 1);
        assert_eq!(by_wins[0].key, "2");
    }

    #[test]
    fn fallback_username_derives_from_key() {
        let account = PlayerAccount {
            key: "42".to_string(),
            chips: 0,
            is_authenticated: true,
            profile: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let row = LeaderboardRow::new(&account, PlayerStats::default());
        assert_eq!(row.username, "Player 42");
    }
}
