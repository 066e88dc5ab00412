// Team aggregator: rosters of scored players to Team Impact Rating.
//
// TIR = avg PIV x roster completeness x (1 + synergy). Synergy blends role
// coverage, K/D cohesion and utility balance. Teams are then ranked by TIR,
// and the ranking drives the opponent strength multiplier used by the
// composite PIV mode.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetricsError;
use crate::metrics::finite_or_zero;
use crate::model::{PlayerWithPiv, TeamWithTir};
use crate::roles::ALL_ROLES;

/// Synergy weights and roster size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynergyConfig {
    pub role_coverage_weight: f64,
    pub kd_cohesion_weight: f64,
    pub utility_balance_weight: f64,
    /// Rosters smaller than this are scaled down proportionally.
    pub full_roster_size: usize,
}

impl Default for SynergyConfig {
    fn default() -> Self {
        Self {
            role_coverage_weight: 0.4,
            kd_cohesion_weight: 0.35,
            utility_balance_weight: 0.25,
            full_roster_size: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Synergy
// ---------------------------------------------------------------------------

/// Distinct labeled roles on the roster as a share of all roles.
pub fn role_coverage(roster: &[PlayerWithPiv]) -> f64 {
    let distinct: BTreeSet<_> = roster.iter().map(|p| p.role).collect();
    distinct.len() as f64 / ALL_ROLES.len() as f64
}

/// `1 / (1 + population variance of K/D)`.
pub fn kd_cohesion(roster: &[PlayerWithPiv]) -> f64 {
    if roster.is_empty() {
        return 0.0;
    }
    let n = roster.len() as f64;
    let kds: Vec<f64> = roster.iter().map(|p| finite_or_zero(p.kd)).collect();
    let mean = kds.iter().sum::<f64>() / n;
    let variance = kds.iter().map(|kd| (kd - mean).powi(2)).sum::<f64>() / n;
    1.0 / (1.0 + variance)
}

/// `1 / (1 + mean absolute deviation / mean)` of utility thrown. A roster
/// that threw no utility is perfectly balanced.
pub fn utility_balance(roster: &[PlayerWithPiv]) -> f64 {
    if roster.is_empty() {
        return 0.0;
    }
    let n = roster.len() as f64;
    let utility: Vec<f64> = roster
        .iter()
        .map(|p| p.raw_stats.total_utility_thrown as f64)
        .collect();
    let mean = utility.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 1.0;
    }
    let mad = utility.iter().map(|u| (u - mean).abs()).sum::<f64>() / n;
    1.0 / (1.0 + mad / mean)
}

/// Weighted synergy of a roster.
pub fn synergy_factor(roster: &[PlayerWithPiv], cfg: &SynergyConfig) -> f64 {
    role_coverage(roster) * cfg.role_coverage_weight
        + kd_cohesion(roster) * cfg.kd_cohesion_weight
        + utility_balance(roster) * cfg.utility_balance_weight
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregate one roster into a [`TeamWithTir`].
///
/// Returns `EmptyRoster` for an empty roster. The top player is the
/// highest PIV, ties going to the first in roster order.
pub fn aggregate_team(
    name: &str,
    roster: Vec<PlayerWithPiv>,
    cfg: &SynergyConfig,
) -> Result<TeamWithTir, MetricsError> {
    if roster.is_empty() {
        return Err(MetricsError::EmptyRoster {
            team: name.to_string(),
        });
    }

    let n = roster.len();
    let sum_piv: f64 = roster.iter().map(|p| finite_or_zero(p.piv)).sum();
    let avg_piv = sum_piv / n as f64;
    let synergy = synergy_factor(&roster, cfg);
    let completeness = (n as f64 / cfg.full_roster_size.max(1) as f64).min(1.0);
    let tir = avg_piv * completeness * (1.0 + synergy);

    let mut top = &roster[0];
    for p in &roster[1..] {
        if p.piv > top.piv {
            top = p;
        }
    }
    let top_player_name = top.name.clone();
    let top_player_piv = top.piv;

    debug!(
        "team {}: {} players, avg PIV {:.3}, synergy {:.3}, TIR {:.3}",
        name, n, avg_piv, synergy, tir
    );

    Ok(TeamWithTir {
        name: name.to_string(),
        players: roster,
        tir,
        synergy_factor: synergy,
        sum_piv,
        avg_piv,
        top_player_name,
        top_player_piv,
    })
}

/// Group players by team and aggregate each roster, sorted by TIR
/// descending with ties broken by team name.
///
/// Players keep their input order within a roster. Players with an empty
/// team name are grouped under the empty name like any other team.
pub fn compute_teams(
    players: &[PlayerWithPiv],
    cfg: &SynergyConfig,
) -> Result<Vec<TeamWithTir>, MetricsError> {
    let mut by_team: BTreeMap<&str, Vec<PlayerWithPiv>> = BTreeMap::new();
    for p in players {
        by_team.entry(p.team.as_str()).or_default().push(p.clone());
    }

    let mut teams = by_team
        .into_iter()
        .map(|(name, roster)| aggregate_team(name, roster, cfg))
        .collect::<Result<Vec<_>, _>>()?;

    teams.sort_by(|a, b| b.tir.total_cmp(&a.tir).then_with(|| a.name.cmp(&b.name)));
    Ok(teams)
}

// ---------------------------------------------------------------------------
// Opponent strength
// ---------------------------------------------------------------------------

/// Team count at or below which OSM interpolates linearly by rank.
pub const OSM_LINEAR_MAX_TEAMS: usize = 16;
/// OSM of the last-ranked team in the linear regime.
pub const OSM_LINEAR_FLOOR: f64 = 0.84;
/// Lower bound of OSM in the logarithmic regime.
pub const OSM_MIN: f64 = 0.1;

/// Opponent strength for 1-based `rank` among `team_count` teams.
pub fn osm_for_rank(rank: usize, team_count: usize) -> f64 {
    if rank <= 1 || team_count <= 1 {
        return 1.0;
    }
    if team_count <= OSM_LINEAR_MAX_TEAMS {
        let step = (1.0 - OSM_LINEAR_FLOOR) / (team_count - 1) as f64;
        return 1.0 - (rank - 1) as f64 * step;
    }
    let r = rank as f64;
    let scaled = OSM_MIN + (1.0 - OSM_MIN) * (50f64.ln() / r.ln()).powf(1.5);
    scaled.clamp(OSM_MIN, 1.0)
}

/// OSM per team name, from teams already sorted by TIR descending.
pub fn opponent_strength(teams: &[TeamWithTir]) -> BTreeMap<String, f64> {
    teams
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.clone(), osm_for_rank(i + 1, teams.len())))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
