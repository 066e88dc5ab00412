// Player scoring pipeline: raw stats + role table + weights -> scored players.
//
// Runs classification, normalization and the PIV engine for a whole player
// pool in one pass. The pool matters for the composite mode, which
// normalizes role metrics across all players and ranks teams for opponent
// strength. Output order is PIV descending, then name, then id, so repeated
// runs over the same input produce identical results.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::error::MetricsError;
use crate::metrics::{self, kd};
use crate::model::{
    NormalizedMetrics, PivMode, PlayerWithPiv, RawPlayerStats, RoleInfo, RoundData, Side,
};
use crate::piv;
use crate::roles::{classify, Classification, Role};
use crate::team::{self, SynergyConfig};
use crate::weights::WeightsSnapshot;

/// Inputs that are shared by every player in a scoring run.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub mode: PivMode,
    /// Round exports used by the composite basic score. May be empty.
    pub rounds: Vec<RoundData>,
    /// Opponent strength per team for composite mode. When `None`, composite
    /// mode derives it from a weighted-mode ranking of the same pool.
    pub osm: Option<BTreeMap<String, f64>>,
    pub synergy: SynergyConfig,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            mode: PivMode::Weighted,
            rounds: Vec::new(),
            osm: None,
            synergy: SynergyConfig::default(),
        }
    }
}

impl ScoringContext {
    pub fn with_mode(mode: PivMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Role-side tables
// ---------------------------------------------------------------------------

/// One player's T and CT role metrics, normalized against the pool.
struct RoleTables {
    t_norm: NormalizedMetrics,
    ct_norm: NormalizedMetrics,
}

impl RoleTables {
    /// Both sides merged, keys prefixed by side.
    fn combined(&self) -> NormalizedMetrics {
        let t = self.t_norm.iter().map(|(k, v)| (format!("T {k}"), v));
        let ct = self.ct_norm.iter().map(|(k, v)| (format!("CT {k}"), v));
        t.chain(ct).collect()
    }

    fn side(&self, side: Side) -> &NormalizedMetrics {
        match side {
            Side::T => &self.t_norm,
            Side::CT => &self.ct_norm,
        }
    }
}

fn role_tables(pool: &[(&RawPlayerStats, Classification)]) -> Vec<RoleTables> {
    let t_raw: Vec<NormalizedMetrics> = pool
        .iter()
        .map(|(s, c)| metrics::t_side_metrics(s, c.t_role))
        .collect();
    let ct_raw: Vec<NormalizedMetrics> = pool
        .iter()
        .map(|(s, c)| metrics::ct_side_metrics(s, c.ct_role))
        .collect();

    t_raw
        .iter()
        .zip(&ct_raw)
        .map(|(t, ct)| RoleTables {
            t_norm: metrics::normalize_against_pool(t, &t_raw),
            ct_norm: metrics::normalize_against_pool(ct, &ct_raw),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Score every player in `raw`.
///
/// Players are looked up in `roles` by steam id, then by name; players
/// missing from the table get an inferred role. `weights` only matters in
/// weighted mode, where `None` or a set without metric weights selects the
/// fallback formula.
///
/// Fails with `MissingInput` when `raw` is empty, and with the first
/// validation error of any player.
pub fn compute_players(
    raw: &[RawPlayerStats],
    roles: &BTreeMap<String, RoleInfo>,
    weights: Option<&WeightsSnapshot>,
    ctx: &ScoringContext,
) -> Result<Vec<PlayerWithPiv>, MetricsError> {
    if raw.is_empty() {
        return Err(MetricsError::MissingInput {
            player: "<all>".into(),
            reason: "no player stats supplied".into(),
        });
    }
    for stats in raw {
        stats.validate()?;
    }

    let weights = weights.filter(|w| w.has_metric_weights());
    if ctx.mode == PivMode::Weighted {
        match weights {
            Some(w) => info!(
                "scoring {} players with learned weights (version '{}', {} keys)",
                raw.len(),
                w.version(),
                w.len()
            ),
            None => warn!(
                "no learned weights available, scoring {} players with the fallback formula",
                raw.len()
            ),
        }
    } else {
        info!("scoring {} players in {:?} mode", raw.len(), ctx.mode);
    }

    let pool: Vec<(&RawPlayerStats, Classification)> = raw
        .iter()
        .map(|stats| {
            let role_info = roles
                .get(stats.player_key())
                .or_else(|| roles.get(stats.display_name()));
            (stats, classify(stats, role_info))
        })
        .collect();
    let tables = role_tables(&pool);

    let osm = match (ctx.mode, &ctx.osm) {
        (PivMode::Composite, Some(table)) => table.clone(),
        (PivMode::Composite, None) => derive_osm(raw, roles, weights, ctx)?,
        _ => BTreeMap::new(),
    };

    let mut players: Vec<PlayerWithPiv> = pool
        .iter()
        .zip(&tables)
        .map(|((stats, class), tables)| {
            let team_osm = osm.get(&stats.team).copied().unwrap_or(1.0);
            score_player(stats, class, tables, weights, ctx, team_osm)
        })
        .collect();

    players.sort_by(|a, b| {
        b.piv
            .total_cmp(&a.piv)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(players)
}

/// Rank teams by a weighted-mode pass over the same pool and map the ranks
/// to opponent strength.
fn derive_osm(
    raw: &[RawPlayerStats],
    roles: &BTreeMap<String, RoleInfo>,
    weights: Option<&WeightsSnapshot>,
    ctx: &ScoringContext,
) -> Result<BTreeMap<String, f64>, MetricsError> {
    let ranking_ctx = ScoringContext {
        mode: PivMode::Weighted,
        osm: None,
        rounds: Vec::new(),
        synergy: ctx.synergy,
    };
    let ranked = compute_players(raw, roles, weights, &ranking_ctx)?;
    let teams = team::compute_teams(&ranked, &ctx.synergy)?;
    Ok(team::opponent_strength(&teams))
}

fn score_player(
    stats: &RawPlayerStats,
    class: &Classification,
    tables: &RoleTables,
    weights: Option<&WeightsSnapshot>,
    ctx: &ScoringContext,
    osm: f64,
) -> PlayerWithPiv {
    let kd = kd(stats.kills, stats.deaths);

    let overall = |s: &RawPlayerStats, role: Role, role_metrics: &NormalizedMetrics| -> f64 {
        match ctx.mode {
            PivMode::Weighted => piv::compute_piv(s, role, weights),
            PivMode::Legacy => piv::legacy_piv(s, role, class.is_igl),
            PivMode::Composite => {
                let c = piv::composite_components(
                    s,
                    role,
                    class.is_igl,
                    role_metrics,
                    &ctx.rounds,
                    osm,
                );
                piv::composite_piv(&c, role)
            }
        }
    };

    // Legacy scores the T-side role and applies leadership as a bonus.
    let role = match ctx.mode {
        PivMode::Legacy => class.t_role,
        _ => class.role,
    };
    let combined = tables.combined();
    let score = overall(stats, role, &combined);

    let side_piv = |side: Side, side_role: Role| {
        stats
            .for_side(side)
            .map(|side_stats| overall(&side_stats, side_role, tables.side(side)))
    };
    let t_piv = side_piv(Side::T, class.t_role);
    let ct_piv = side_piv(Side::CT, class.ct_role);

    let mut metrics = metrics::normalize(stats);
    metrics.extend(combined);

    PlayerWithPiv {
        id: stats.player_key().to_string(),
        name: stats.display_name().to_string(),
        team: stats.team.clone(),
        role: class.role,
        t_role: class.t_role,
        ct_role: class.ct_role,
        is_igl: class.is_igl,
        mode: ctx.mode,
        piv: score,
        t_piv,
        ct_piv,
        kd,
        primary_metric: piv::primary_metric(class.role, stats, kd),
        raw_stats: stats.clone(),
        metrics,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightMetadata;

    // ---- Helpers ----

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn stats(id: &str, name: &str, team: &str, kills: u32, deaths: u32) -> RawPlayerStats {
        RawPlayerStats {
            steam_id: id.into(),
            name: name.into(),
            team: team.into(),
            kills,
            deaths,
            assists: 4,
            adr: 75.0,
            kast: 70.0,
            flashes_thrown: 15,
            total_utility_thrown: 30,
            flash_assists: 3,
            rounds_played: 48,
            rounds_won: 26,
            t_rounds_won: 12,
            ct_rounds_won: 14,
            ..Default::default()
        }
    }

    fn pool() -> Vec<RawPlayerStats> {
        vec![
            stats("1", "karrigan", "FaZe", 14, 18),
            stats("2", "broky", "FaZe", 22, 14),
            stats("3", "aleksib", "NAVI", 15, 17),
            RawPlayerStats {
                adr_t: Some(82.0),
                kast_t: Some(72.0),
                adr_ct: Some(68.0),
                kast_ct: Some(68.0),
                ..stats("4", "jL", "NAVI", 20, 15)
            },
        ]
    }

    fn roles() -> BTreeMap<String, RoleInfo> {
        let mut m = BTreeMap::new();
        m.insert(
            "1".into(),
            RoleInfo {
                is_igl: true,
                t_role: Role::Lurker,
                ct_role: Role::Anchor,
            },
        );
        m.insert(
            "broky".into(),
            RoleInfo {
                is_igl: false,
                t_role: Role::AWP,
                ct_role: Role::AWP,
            },
        );
        m
    }

    fn weights() -> WeightsSnapshot {
        let w: BTreeMap<String, f64> = [("kills", 0.1), ("adr_norm", 1.0), ("role_IGL", 1.15)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        WeightsSnapshot::new(w, WeightMetadata::default())
    }

    // ---- Tests ----

    #[test]
    fn empty_input_is_missing_input() {
        let err = compute_players(&[], &roles(), None, &ScoringContext::default()).unwrap_err();
        assert!(matches!(err, MetricsError::MissingInput { .. }));
    }

    #[test]
    fn invalid_player_propagates() {
        let mut raw = pool();
        raw[1].kast = 130.0;
        let err = compute_players(&raw, &roles(), None, &ScoringContext::default()).unwrap_err();
        match err {
            MetricsError::InvalidStat { player, field, .. } => {
                assert_eq!(player, "broky");
                assert_eq!(field, "kast");
            }
            other => panic!("expected InvalidStat, got: {other}"),
        }
    }

    #[test]
    fn roles_resolved_by_id_then_name_then_inferred() {
        let players =
            compute_players(&pool(), &roles(), None, &ScoringContext::default()).unwrap();
        let find = |name: &str| players.iter().find(|p| p.name == name).unwrap();
        assert_eq!(find("karrigan").role, Role::IGL);
        assert_eq!(find("karrigan").t_role, Role::Lurker);
        assert_eq!(find("broky").role, Role::AWP);
        assert_eq!(find("aleksib").role, Role::Support);
        assert_eq!(find("aleksib").ct_role, Role::Rotator);
    }

    #[test]
    fn weighted_mode_matches_engine() {
        let w = weights();
        let players =
            compute_players(&pool(), &roles(), Some(&w), &ScoringContext::default()).unwrap();
        let karrigan = players.iter().find(|p| p.name == "karrigan").unwrap();
        let expected = (14.0 * 0.1 + 0.75) * 1.15;
        assert!(approx_eq(karrigan.piv, expected, 1e-9), "got {}", karrigan.piv);
        assert_eq!(karrigan.mode, PivMode::Weighted);
    }

    #[test]
    fn output_sorted_by_piv_descending() {
        let players =
            compute_players(&pool(), &roles(), None, &ScoringContext::default()).unwrap();
        for pair in players.windows(2) {
            assert!(pair[0].piv >= pair[1].piv);
        }
    }

    #[test]
    fn side_piv_only_with_side_values() {
        let players =
            compute_players(&pool(), &roles(), None, &ScoringContext::default()).unwrap();
        let jl = players.iter().find(|p| p.name == "jL").unwrap();
        assert!(jl.t_piv.is_some());
        assert!(jl.ct_piv.is_some());
        assert!(jl.t_piv.unwrap() > jl.ct_piv.unwrap());
        let broky = players.iter().find(|p| p.name == "broky").unwrap();
        assert_eq!(broky.t_piv, None);
        assert_eq!(broky.ct_piv, None);
    }

    #[test]
    fn repeated_runs_are_identical() {
        for mode in [PivMode::Weighted, PivMode::Legacy, PivMode::Composite] {
            let ctx = ScoringContext::with_mode(mode);
            let w = weights();
            let a = compute_players(&pool(), &roles(), Some(&w), &ctx).unwrap();
            let b = compute_players(&pool(), &roles(), Some(&w), &ctx).unwrap();
            assert_eq!(a, b, "{mode:?} not idempotent");
        }
    }

    #[test]
    fn every_mode_stays_in_range() {
        for mode in [PivMode::Weighted, PivMode::Legacy, PivMode::Composite] {
            let players =
                compute_players(&pool(), &roles(), None, &ScoringContext::with_mode(mode)).unwrap();
            for p in &players {
                assert!((0.0..=mode.ceiling()).contains(&p.piv), "{mode:?}: {}", p.piv);
                assert_eq!(p.mode, mode);
            }
        }
    }

    #[test]
    fn composite_uses_supplied_osm() {
        let mut weak = BTreeMap::new();
        weak.insert("FaZe".to_string(), 0.5);
        weak.insert("NAVI".to_string(), 0.5);
        let strong = ScoringContext {
            osm: Some(BTreeMap::new()),
            ..ScoringContext::with_mode(PivMode::Composite)
        };
        let halved = ScoringContext {
            osm: Some(weak),
            ..ScoringContext::with_mode(PivMode::Composite)
        };
        let a = compute_players(&pool(), &roles(), None, &strong).unwrap();
        let b = compute_players(&pool(), &roles(), None, &halved).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.name, y.name);
            assert!(approx_eq(y.piv, x.piv * 0.5, 1e-12));
        }
    }

    #[test]
    fn metrics_include_side_tables() {
        let players =
            compute_players(&pool(), &roles(), None, &ScoringContext::default()).unwrap();
        let broky = players.iter().find(|p| p.name == "broky").unwrap();
        assert!(broky.metrics.get("kd_norm").is_some());
        assert!(broky.metrics.get("T Opening Pick Success Rate").is_some());
        assert!(broky.metrics.get("CT Site Lockdown Rate").is_some());
    }

    #[test]
    fn primary_metric_follows_role() {
        let players =
            compute_players(&pool(), &roles(), None, &ScoringContext::default()).unwrap();
        let aleksib = players.iter().find(|p| p.name == "aleksib").unwrap();
        assert_eq!(aleksib.primary_metric.name, "Flash Assists");
        assert_eq!(aleksib.primary_metric.value, 3.0);
    }
}
