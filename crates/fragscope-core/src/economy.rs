// Team-level round economy rates computed from round exports.
//
// All rates are wins / opportunities for the named team and are 0 when the
// team had no qualifying rounds.

use crate::model::{BuyType, RoundData, Side};

/// Share of eco and force-buy rounds (full eco, semi-eco, semi-buy) the team
/// went on to win.
pub fn eco_force_conversion(rounds: &[RoundData], team: &str) -> f64 {
    win_rate_where(rounds, team, |round, is_ct| {
        let buy = if is_ct { round.ct_buy_type } else { round.t_buy_type };
        buy.is_eco_or_force()
    })
}

/// Share of rounds with a 5v4 man advantage on the team's side that the team
/// converted.
pub fn five_v_four_conversion(rounds: &[RoundData], team: &str) -> f64 {
    win_rate_where(rounds, team, |round, is_ct| {
        round
            .advantage_5v4
            .is_some_and(|side| (side == Side::CT) == is_ct)
    })
}

/// Share of full-buy rounds the team won.
pub fn rifle_round_win_rate(rounds: &[RoundData], team: &str) -> f64 {
    win_rate_where(rounds, team, |round, is_ct| {
        let buy = if is_ct { round.ct_buy_type } else { round.t_buy_type };
        buy == BuyType::FullBuy
    })
}

fn win_rate_where<F>(rounds: &[RoundData], team: &str, qualifies: F) -> f64
where
    F: Fn(&RoundData, bool) -> bool,
{
    let mut played = 0u32;
    let mut won = 0u32;
    for round in rounds {
        let Some(side) = round.side_of(team) else {
            continue;
        };
        let is_ct = side == Side::CT;
        if !qualifies(round, is_ct) {
            continue;
        }
        played += 1;
        if round.winner_team == team {
            won += 1;
        }
    }
    if played == 0 {
        0.0
    } else {
        won as f64 / played as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
