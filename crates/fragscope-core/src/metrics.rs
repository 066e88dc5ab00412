// Metric normalizer: raw counting stats to bounded, comparable scores.
//
// Three layers live here:
// 1. Base normalization (K/D, ADR, KAST) and the named stat inputs that a
//    learned weight set can reference.
// 2. Role-side metric tables (T-side and CT-side rates per role) plus
//    min-max normalization against the player pool.
// 3. Composite sub-scores used by the composite PIV mode: RCS, ICF, SC and
//    the role basic score.
//
// Every sub-score is finite. NaN or infinite inputs contribute 0.

use serde::{Deserialize, Serialize};

use crate::economy;
use crate::model::{NormalizedMetrics, RawPlayerStats, RoundData};
use crate::roles::Role;

/// ADR normalization caps at 150% of the nominal 100 ADR baseline.
pub const ADR_NORM_CAP: f64 = 1.5;

// ---------------------------------------------------------------------------
// Base normalization
// ---------------------------------------------------------------------------

/// Replace NaN and infinities with 0.
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// `num / max(den, 1)`: the ratio guard used throughout the role tables.
pub fn ratio(num: u32, den: u32) -> f64 {
    num as f64 / den.max(1) as f64
}

/// Kills per death. A player with zero deaths scores their full kill count
/// rather than infinity.
pub fn kd(kills: u32, deaths: u32) -> f64 {
    if deaths > 0 {
        kills as f64 / deaths as f64
    } else {
        kills as f64
    }
}

/// ADR relative to a 100 ADR baseline, clamped to [0, 1.5].
pub fn adr_normalized(adr: f64) -> f64 {
    (finite_or_zero(adr) / 100.0).clamp(0.0, ADR_NORM_CAP)
}

/// KAST percentage scaled to [0, 1].
pub fn kast_normalized(kast: f64) -> f64 {
    (finite_or_zero(kast) / 100.0).clamp(0.0, 1.0)
}

/// Opening duels won as a share of opening duels taken.
pub fn first_kill_success(stats: &RawPlayerStats) -> f64 {
    ratio(stats.entry_kills, stats.entry_kills + stats.entry_deaths)
}

/// Flash assists per flash thrown.
pub fn flash_efficiency(stats: &RawPlayerStats) -> f64 {
    ratio(stats.flash_assists, stats.flashes_thrown)
}

/// Composite impact: `0.4 kd + 0.3 first-kill success + 0.2 flash
/// efficiency`.
pub fn impact_score(stats: &RawPlayerStats) -> f64 {
    0.4 * kd(stats.kills, stats.deaths)
        + 0.3 * first_kill_success(stats)
        + 0.2 * flash_efficiency(stats)
}

/// Bounded per-player metrics used for display and stored on the output
/// record.
pub fn normalize(stats: &RawPlayerStats) -> NormalizedMetrics {
    let kd = kd(stats.kills, stats.deaths);
    let mut m = NormalizedMetrics::new();
    m.insert("kd_norm", kd.min(2.0) / 2.0);
    m.insert("adr_norm", adr_normalized(stats.adr));
    m.insert("kast_norm", kast_normalized(stats.kast));
    m.insert("headshot_pct", ratio(stats.headshots, stats.kills));
    m.insert("first_kill_success", first_kill_success(stats));
    m.insert("flash_efficiency", flash_efficiency(stats));
    m.insert("trade_efficiency", ratio(stats.trade_kills, stats.kills));
    m.insert(
        "utility_effectiveness",
        stats.assists as f64 / (stats.total_utility_thrown as f64 + 1.0),
    );
    m.insert("site_control", ratio(stats.ct_rounds_won, stats.rounds_won));
    m.insert("clutch_rate", ratio(stats.clutch_wins, stats.clutch_attempts));
    m
}

/// Every named value a learned weight set may reference: raw counts, rates,
/// and the normalized metrics from [`normalize`].
pub fn stat_inputs(stats: &RawPlayerStats) -> NormalizedMetrics {
    let mut m = NormalizedMetrics::new();
    let counts: [(&str, u32); 16] = [
        ("kills", stats.kills),
        ("deaths", stats.deaths),
        ("assists", stats.assists),
        ("headshots", stats.headshots),
        ("flash_assists", stats.flash_assists),
        ("entry_kills", stats.entry_kills),
        ("entry_deaths", stats.entry_deaths),
        ("multi_kills", stats.multi_kills),
        ("clutch_wins", stats.clutch_wins),
        ("clutch_attempts", stats.clutch_attempts),
        ("utility_damage", stats.utility_damage),
        ("utility_thrown", stats.total_utility_thrown),
        ("awp_kills", stats.awp_kills),
        ("trade_kills", stats.trade_kills),
        ("rounds", stats.rounds_played),
        ("maps", stats.maps_played),
    ];
    for (name, v) in counts {
        m.insert(name, v as f64);
    }
    m.insert("adr", finite_or_zero(stats.adr));
    m.insert("kast", finite_or_zero(stats.kast));
    m.insert("kd", kd(stats.kills, stats.deaths));
    m.insert("rating", finite_or_zero(stats.rating));
    m.insert("impact", finite_or_zero(stats.impact));
    m.insert("impact_score", impact_score(stats));
    m.extend(normalize(stats));
    m
}

// ---------------------------------------------------------------------------
// Role-side metric tables
// ---------------------------------------------------------------------------

/// T-side rates characteristic of `role`.
pub fn t_side_metrics(stats: &RawPlayerStats, role: Role) -> NormalizedMetrics {
    let s = stats;
    let kd = kd(s.kills, s.deaths);
    let t_entry = ratio(s.t_entry_kills, s.t_entry_kills + s.t_entry_deaths);
    let mut m = NormalizedMetrics::new();
    match role {
        Role::IGL => {
            m.insert("T-Side Round Win Rate", ratio(s.t_rounds_won, s.rounds_won));
            m.insert("T-Side Tactical Efficiency", t_entry);
            m.insert(
                "T-Side Utility Coordination",
                ratio(s.t_flashes_thrown, s.flashes_thrown),
            );
        }
        Role::AWP => {
            m.insert("Opening Pick Success Rate", t_entry);
            m.insert("Multi Kill Conversion", ratio(s.awp_kills, s.kills));
            m.insert(
                "AWPer Flash Assistance",
                ratio(s.flash_assists, s.total_utility_thrown),
            );
            m.insert("Utility Punish Rate", ratio(s.through_smoke_kills, s.kills));
        }
        Role::Spacetaker | Role::Entry => {
            m.insert("Entry Success Rate", t_entry);
            m.insert("Trade Setup Efficiency", ratio(s.trade_kills, s.kills));
            m.insert(
                "T-Side Impact Rating",
                (s.t_entry_kills * 2 + s.kills) as f64 / (s.t_rounds_won * 5).max(1) as f64,
            );
        }
        Role::Lurker => {
            m.insert(
                "Solo Kill Rate",
                ratio(s.kills.saturating_sub(s.trade_kills), s.kills),
            );
            m.insert("Information Gathering", ratio(s.through_smoke_kills, s.kills));
            m.insert("Late Round Impact", kd);
        }
        Role::Support => {
            m.insert(
                "Flash Assistance Rate",
                ratio(s.flash_assists, s.total_utility_thrown),
            );
            m.insert(
                "Utility Distribution",
                ratio(s.t_flashes_thrown, s.flashes_thrown),
            );
            m.insert("Team Support Index", ratio(s.assists, s.kills + s.assists));
        }
        Role::Anchor | Role::Rotator => {
            m.insert("T-Side Adaptability", ratio(s.t_rounds_won, s.rounds_won));
            m.insert("Role Flexibility", kd);
        }
    }
    m
}

/// CT-side rates characteristic of `role`.
pub fn ct_side_metrics(stats: &RawPlayerStats, role: Role) -> NormalizedMetrics {
    let s = stats;
    let kd = kd(s.kills, s.deaths);
    let ct_entry = ratio(s.ct_entry_kills, s.ct_entry_kills + s.ct_entry_deaths);
    let ct_win_share = ratio(s.ct_rounds_won, s.rounds_won);
    let mut m = NormalizedMetrics::new();
    match role {
        Role::IGL => {
            m.insert("CT-Side Round Win Rate", ct_win_share);
            m.insert("Defensive Coordination", ct_entry);
            m.insert(
                "CT Utility Management",
                ratio(s.ct_flashes_thrown, s.flashes_thrown),
            );
        }
        Role::AWP => {
            m.insert("Site Lockdown Rate", ct_win_share);
            m.insert("Entry Denial Efficiency", ct_entry);
            m.insert("Angle Hold Success", kd);
            m.insert("Retake Contribution Index", ratio(s.awp_kills, s.kills));
        }
        Role::Anchor => {
            m.insert("Site Hold Effectiveness", ct_win_share);
            m.insert("Solo Defense Rating", ratio(s.ct_entry_kills, s.entry_kills));
            m.insert("Anchor Consistency", 1.0 - (kd - 1.0).abs());
        }
        Role::Rotator => {
            m.insert("Rotation Efficiency", ct_win_share);
            m.insert("Multi-Site Impact", ratio(s.assists, s.kills + s.assists));
            m.insert("CT Flexibility Index", ratio(s.ct_entry_kills, s.entry_kills));
        }
        Role::Support => {
            m.insert(
                "CT Flash Support",
                ratio(s.ct_flashes_thrown, s.flashes_thrown),
            );
            m.insert(
                "Defensive Utility Usage",
                ratio(s.total_utility_thrown, s.ct_rounds_won),
            );
            m.insert(
                "Team Cohesion Factor",
                ratio(s.flash_assists, s.total_utility_thrown),
            );
        }
        Role::Spacetaker | Role::Entry | Role::Lurker => {
            m.insert("CT-Side Adaptability", ct_win_share);
            m.insert("Role Flexibility", kd);
        }
    }
    m
}

/// Min-max normalize each metric against the same metric across `pool`.
///
/// A metric whose pool values are all equal normalizes to 1. Players in the
/// pool that lack a metric contribute 0 for it. An empty pool compares the
/// player only with themselves.
pub fn normalize_against_pool(
    metrics: &NormalizedMetrics,
    pool: &[NormalizedMetrics],
) -> NormalizedMetrics {
    metrics
        .iter()
        .map(|(name, raw)| {
            let own = finite_or_zero(raw);
            let (min, max) = if pool.is_empty() {
                (own, own)
            } else {
                pool.iter()
                    .map(|m| m.value(name))
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    })
            };
            let scaled = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                ((own - min) / (max - min)).clamp(0.0, 1.0)
            };
            (name.to_string(), scaled)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Composite sub-scores
// ---------------------------------------------------------------------------

/// Role Core Score: equal-weight mean of pool-normalized role metrics.
pub fn rcs(normalized: &NormalizedMetrics) -> f64 {
    if normalized.is_empty() {
        return 0.0;
    }
    let weight = 1.0 / normalized.len() as f64;
    normalized
        .keys()
        .map(|k| normalized.value(k) * weight)
        .sum()
}

/// Individual Consistency Factor and the dispersion it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Icf {
    pub value: f64,
    pub sigma: f64,
}

/// Consistency from K/D: strong fraggers are assumed stable, K/D far from
/// 1.0 in either direction widens sigma. IGLs are discounted because their
/// fragging is not their job.
pub fn icf(kd: f64, is_igl: bool) -> Icf {
    if !kd.is_finite() || kd <= 0.0 {
        return Icf {
            value: 0.5,
            sigma: 1.0,
        };
    }

    let sigma = if kd >= 1.4 {
        0.3
    } else if kd >= 1.2 {
        0.5
    } else if kd >= 1.0 {
        (1.0 - kd).abs() * 1.2
    } else {
        (1.0 - kd).abs() * 1.8
    };

    let mut value = 1.0 / (1.0 + sigma);
    if kd > 1.3 {
        value = (value * (1.0 + (kd - 1.3) * 0.5)).min(1.0);
    }
    if is_igl {
        value *= if kd >= 1.2 { 0.85 } else { 0.75 };
    } else if kd > 1.2 {
        value = (value + (kd - 1.2) * 0.25).min(1.0);
    }

    Icf { value, sigma }
}

/// Synergy Contribution: a role-specific rating and its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sc {
    pub value: f64,
    pub metric: String,
}

/// Role-specific synergy contribution.
pub fn sc(stats: &RawPlayerStats, role: Role) -> Sc {
    let s = stats;
    let raw_kd = kd(s.kills, s.deaths);
    let valid_kd = if raw_kd > 0.0 { raw_kd } else { 1.0 };
    let kd_factor = (valid_kd / 2.0).min(0.6);

    let (value, metric) = match role {
        Role::AWP => {
            let opening = ratio(s.entry_kills, s.entry_kills + s.entry_deaths);
            let kd_rating = (valid_kd / 1.8).min(0.85);
            let utility = ratio(s.flash_assists, s.total_utility_thrown);
            (
                opening * 0.35 + kd_rating * 0.35 + utility * 0.15 + kd_factor * 0.15,
                "AWP Impact Rating",
            )
        }
        Role::IGL => (
            ratio(s.assists, s.kills) * 0.4 + kd_factor * 0.2,
            "In-game Impact Rating",
        ),
        Role::Spacetaker | Role::Entry => {
            let entry = ratio(s.t_entry_kills, s.t_entry_kills + s.t_entry_deaths);
            let kd_rating = (raw_kd / 1.3).min(1.0);
            (
                entry * 0.5 + kd_rating * 0.4 + kd_factor * 0.1,
                "Entry Impact Rating",
            )
        }
        Role::Lurker => {
            let clutch = (raw_kd / 1.3).min(1.0);
            let smoke = ratio(s.through_smoke_kills, s.kills);
            (
                clutch * 0.45 + smoke * 0.35 + kd_factor * 0.2,
                "Clutch & Information Rating",
            )
        }
        Role::Anchor => (
            ratio(s.ct_rounds_won, s.rounds_won) * 0.45 + kd_factor * 0.25,
            "Site Hold Effectiveness",
        ),
        Role::Rotator => (
            ratio(s.ct_rounds_won, s.rounds_won) * 0.4 + kd_factor * 0.25,
            "Rotation Efficiency",
        ),
        Role::Support => (
            ratio(s.flash_assists, s.total_utility_thrown) * 0.65 + kd_factor * 0.15,
            "Utility Contribution Score",
        ),
    };

    Sc {
        value: finite_or_zero(value),
        metric: metric.to_string(),
    }
}

/// Role basic score in [0, 1]: a blend of raw rates and the team's round
/// economy rates.
pub fn basic_score(stats: &RawPlayerStats, role: Role, rounds: &[RoundData]) -> f64 {
    let s = stats;
    let team = s.team.as_str();
    let capped_kd = kd(s.kills, s.deaths).min(2.0) / 2.0;
    let flash_share = ratio(s.flash_assists, s.total_utility_thrown);
    let assist_rate = ratio(s.assists, s.kills + s.assists);

    let score = match role {
        Role::IGL => {
            economy::rifle_round_win_rate(rounds, team) * 0.35
                + flash_share * 0.30
                + economy::eco_force_conversion(rounds, team) * 0.21
                + economy::five_v_four_conversion(rounds, team) * 0.14
        }
        Role::AWP => {
            let opening = ratio(s.entry_kills, s.entry_kills + s.entry_deaths);
            let awp_share = if s.kills > 0 {
                s.awp_kills as f64 / s.kills as f64
            } else {
                0.0
            };
            let survival = (s.kills as f64 - s.deaths as f64 + s.assists as f64)
                / (s.kills + s.assists).max(1) as f64;
            opening * 0.26
                + awp_share * 0.19
                + capped_kd * 0.15
                + survival.max(0.0) * 0.06
                + flash_share * 0.12
                + economy::five_v_four_conversion(rounds, team) * 0.22
        }
        Role::Spacetaker | Role::Entry => {
            ratio(s.t_entry_kills, s.t_entry_kills + s.t_entry_deaths) * 0.35
                + capped_kd * 0.25
                + ratio(s.trade_kills, s.kills) * 0.20
                + economy::five_v_four_conversion(rounds, team) * 0.20
        }
        Role::Lurker => {
            capped_kd * 0.30
                + ratio(s.through_smoke_kills, s.kills) * 0.25
                + ratio(s.kills.saturating_sub(s.trade_kills), s.kills) * 0.25
                + economy::eco_force_conversion(rounds, team) * 0.20
        }
        Role::Anchor => {
            let util_per_win = ratio(s.total_utility_thrown, s.rounds_won);
            ratio(s.ct_rounds_won, s.rounds_won) * 0.35
                + capped_kd * 0.25
                + economy::rifle_round_win_rate(rounds, team) * 0.25
                + (util_per_win / 5.0).min(1.0) * 0.15
        }
        Role::Rotator => {
            let losses_proxy = s.deaths as f64 - s.rounds_won as f64;
            let win_rate =
                s.rounds_won as f64 / (s.rounds_won as f64 + losses_proxy).max(1.0);
            let side_balance = 1.0 - (ratio(s.ct_rounds_won, s.rounds_won) - 0.5).abs() * 2.0;
            win_rate * 0.30
                + side_balance * 0.25
                + assist_rate * 0.25
                + economy::five_v_four_conversion(rounds, team) * 0.20
        }
        Role::Support => {
            let util_per_win = ratio(s.total_utility_thrown, s.rounds_won);
            flash_share * 0.40
                + (util_per_win / 6.0).min(1.0) * 0.25
                + assist_rate * 0.20
                + economy::eco_force_conversion(rounds, team) * 0.15
        }
    };

    finite_or_zero(score).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
