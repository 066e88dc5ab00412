// PIV engine: one Player Impact Value per player.
//
// Three formulas are in use and live on different scales, so each is a
// named mode (see `PivMode`):
// - Weighted: learned weighted sum x role multiplier, [0, 10]. Falls back
//   to a fixed formula when no weight set is available.
// - Legacy: kd/ADR/KAST blend x role multiplier x IGL bonus, [0, 1].
// - Composite: RCS x ICF x SC x OSM x basic score x role weight, [0, 10].
//
// In every mode multipliers apply after the additive base.

use tracing::debug;

use crate::metrics::{self, adr_normalized, finite_or_zero, kast_normalized, kd};
use crate::model::{NormalizedMetrics, PrimaryMetric, RawPlayerStats, RoundData};
use crate::roles::Role;
use crate::weights::WeightsSnapshot;

/// Upper clamp for weighted and fallback scores.
pub const WEIGHTED_PIV_MAX: f64 = 10.0;
/// Upper clamp for legacy scores.
pub const LEGACY_PIV_MAX: f64 = 1.0;
/// Upper clamp for composite scores.
pub const COMPOSITE_PIV_MAX: f64 = 10.0;

/// Multiplier applied to legacy scores of in-game leaders.
pub const LEGACY_IGL_BONUS: f64 = 1.1;

/// Neutral stand-in for a zero or non-finite composite component.
const NEUTRAL_COMPONENT: f64 = 0.5;
/// Neutral stand-in for a zero or non-finite opponent strength.
const NEUTRAL_OSM: f64 = 1.0;

fn clamp_score(v: f64, max: f64) -> f64 {
    finite_or_zero(v).clamp(0.0, max)
}

// ---------------------------------------------------------------------------
// Weighted mode
// ---------------------------------------------------------------------------

/// Compute PIV in weighted mode.
///
/// With a weight set that has metric weights: sum `stat * weight` over every
/// metric weight whose stat exists in [`metrics::stat_inputs`] (unknown names
/// are skipped), then multiply by the role's multiplier if the set has one.
/// Otherwise use [`fallback_piv`]. The result is clamped to [0, 10].
pub fn compute_piv(stats: &RawPlayerStats, role: Role, weights: Option<&WeightsSnapshot>) -> f64 {
    match weights {
        Some(w) if w.has_metric_weights() => weighted_piv(stats, role, w),
        _ => fallback_piv(stats, role),
    }
}

fn weighted_piv(stats: &RawPlayerStats, role: Role, weights: &WeightsSnapshot) -> f64 {
    let inputs = metrics::stat_inputs(stats);
    let mut base = 0.0;
    for (name, weight) in weights.metric_weights() {
        match inputs.get(name) {
            Some(_) => base += inputs.value(name) * weight,
            None => debug!("weight key '{}' has no matching stat, skipping", name),
        }
    }

    let piv = match weights.role_multiplier(role) {
        Some(multiplier) => base * multiplier,
        None => base,
    };
    clamp_score(piv, WEIGHTED_PIV_MAX)
}

/// Role multiplier used by the fallback formula.
pub fn fallback_role_multiplier(role: Role) -> f64 {
    match role {
        Role::AWP => 1.1,
        Role::IGL => 1.15,
        Role::Support => 1.05,
        _ => 1.0,
    }
}

/// The fixed formula used when no weight set is available:
/// `(kd*2.5 + adr/100*3.5 + kast/100*2.5 + impact/2*1.5) * multiplier / 2`,
/// clamped to [0, 10].
pub fn fallback_piv(stats: &RawPlayerStats, role: Role) -> f64 {
    let kd = kd(stats.kills, stats.deaths);
    let adr = finite_or_zero(stats.adr) / 100.0;
    let kast = finite_or_zero(stats.kast) / 100.0;
    let impact = finite_or_zero(stats.impact) / 2.0;

    let base = kd * 2.5 + adr * 3.5 + kast * 2.5 + impact * 1.5;
    clamp_score(base * fallback_role_multiplier(role) / 2.0, WEIGHTED_PIV_MAX)
}

// ---------------------------------------------------------------------------
// Legacy mode
// ---------------------------------------------------------------------------

/// Stat-conditional role multiplier of the legacy formula.
pub fn legacy_role_multiplier(stats: &RawPlayerStats, role: Role) -> f64 {
    match role {
        Role::AWP => {
            if kd(stats.kills, stats.deaths) > 1.2 {
                1.2
            } else {
                0.9
            }
        }
        Role::Entry => {
            if stats.entry_kills > 0 {
                1.1
            } else {
                0.95
            }
        }
        Role::IGL => 1.05,
        Role::Support => {
            if stats.flash_assists > 5 {
                1.1
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

/// Legacy PIV: `(kd*0.4 + adr_norm*0.3 + kast_norm*0.3) * role multiplier *
/// IGL bonus`, clamped to [0, 1].
pub fn legacy_piv(stats: &RawPlayerStats, role: Role, is_igl: bool) -> f64 {
    let base = kd(stats.kills, stats.deaths) * 0.4
        + adr_normalized(stats.adr) * 0.3
        + kast_normalized(stats.kast) * 0.3;
    let igl_bonus = if is_igl { LEGACY_IGL_BONUS } else { 1.0 };
    clamp_score(
        base * legacy_role_multiplier(stats, role) * igl_bonus,
        LEGACY_PIV_MAX,
    )
}

// ---------------------------------------------------------------------------
// Composite mode
// ---------------------------------------------------------------------------

/// The factors multiplied together by the composite formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeComponents {
    pub rcs: f64,
    pub icf: f64,
    pub sc: f64,
    pub osm: f64,
    pub basic: f64,
}

impl CompositeComponents {
    /// Replace zero or non-finite factors with neutral values so one missing
    /// input cannot zero out the product.
    pub fn sanitized(&self) -> Self {
        let fix = |v: f64, neutral: f64| if v.is_finite() && v > 0.0 { v } else { neutral };
        Self {
            rcs: fix(self.rcs, NEUTRAL_COMPONENT),
            icf: fix(self.icf, NEUTRAL_COMPONENT),
            sc: fix(self.sc, NEUTRAL_COMPONENT),
            osm: fix(self.osm, NEUTRAL_OSM),
            basic: fix(self.basic, NEUTRAL_COMPONENT),
        }
    }

    /// Product of the sanitized factors before the role weight.
    pub fn base(&self) -> f64 {
        let c = self.sanitized();
        c.rcs * c.icf * c.sc * c.osm * c.basic
    }
}

/// Role weight of the composite formula.
pub fn composite_role_weight(role: Role) -> f64 {
    match role {
        Role::AWP => 1.2,
        Role::IGL => 1.15,
        Role::Spacetaker | Role::Entry => 1.1,
        Role::Lurker => 1.05,
        Role::Anchor | Role::Rotator => 1.0,
        Role::Support => 0.95,
    }
}

/// Composite PIV, clamped to [0, 10].
pub fn composite_piv(components: &CompositeComponents, role: Role) -> f64 {
    clamp_score(
        components.base() * composite_role_weight(role),
        COMPOSITE_PIV_MAX,
    )
}

/// Build the composite factors for one player.
///
/// `role_metrics` are the player's role-side metrics already normalized
/// against the pool; `osm` is the opponent strength for the player's team
/// (1.0 when unknown).
pub fn composite_components(
    stats: &RawPlayerStats,
    role: Role,
    is_igl: bool,
    role_metrics: &NormalizedMetrics,
    rounds: &[RoundData],
    osm: f64,
) -> CompositeComponents {
    let kd = kd(stats.kills, stats.deaths);
    CompositeComponents {
        rcs: metrics::rcs(role_metrics),
        icf: metrics::icf(kd, is_igl).value,
        sc: metrics::sc(stats, role).value,
        osm,
        basic: metrics::basic_score(stats, role, rounds),
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// The role-dependent headline stat shown beside a player's PIV.
pub fn primary_metric(role: Role, stats: &RawPlayerStats, kd: f64) -> PrimaryMetric {
    let (name, value) = match role {
        Role::Support => ("Flash Assists", stats.flash_assists as f64),
        Role::Entry => ("Entry Kills", stats.entry_kills as f64),
        _ => ("K/D Ratio", kd),
    };
    PrimaryMetric {
        name: name.to_string(),
        value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
