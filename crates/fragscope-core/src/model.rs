// Value objects flowing through the impact pipeline.
//
// Raw inputs (player stats, role table rows, rounds) come in from the data
// layer; scored outputs (players with PIV, teams with TIR) go out to display
// consumers. Nothing here holds a reference back to the code that built it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::roles::Role;

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

/// Which half of a map a stat or round advantage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    T,
    CT,
}

impl Side {
    /// Parse a side label ("t", "CT", "terrorist", ...). Returns `None` for
    /// anything else, including the empty string.
    pub fn from_str_side(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "t" | "terrorist" | "terrorists" => Some(Side::T),
            "ct" | "counter-terrorist" | "counter-terrorists" => Some(Side::CT),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw player stats
// ---------------------------------------------------------------------------

/// One player's accumulated counting stats for a scope (match, event or
/// career).
///
/// Counts are unsigned so negativity is unrepresentable; KAST and ADR are
/// checked by [`RawPlayerStats::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayerStats {
    pub steam_id: String,
    pub name: String,
    pub team: String,

    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub headshots: u32,

    pub adr: f64,
    pub adr_t: Option<f64>,
    pub adr_ct: Option<f64>,
    pub kast: f64,
    pub kast_t: Option<f64>,
    pub kast_ct: Option<f64>,

    pub flashes_thrown: u32,
    pub t_flashes_thrown: u32,
    pub ct_flashes_thrown: u32,
    pub smokes_thrown: u32,
    pub he_thrown: u32,
    pub infernos_thrown: u32,
    pub total_utility_thrown: u32,
    pub utility_damage: u32,
    pub flash_assists: u32,

    pub entry_kills: u32,
    pub entry_deaths: u32,
    pub t_entry_kills: u32,
    pub t_entry_deaths: u32,
    pub ct_entry_kills: u32,
    pub ct_entry_deaths: u32,

    pub awp_kills: u32,
    pub trade_kills: u32,
    pub through_smoke_kills: u32,
    pub multi_kills: u32,
    pub clutch_wins: u32,
    pub clutch_attempts: u32,

    pub rounds_played: u32,
    pub maps_played: u32,
    pub rounds_won: u32,
    pub t_rounds_won: u32,
    pub ct_rounds_won: u32,

    /// HLTV-style rating; 0 when the source does not provide one.
    #[serde(default)]
    pub rating: f64,
    /// HLTV-style impact rating; 0 when the source does not provide one.
    #[serde(default)]
    pub impact: f64,
}

impl RawPlayerStats {
    /// Check the structural invariants the pipeline relies on.
    ///
    /// KAST values must lie in [0, 100] and ADR must be finite and
    /// non-negative. Side-split values are checked only when present.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.steam_id.trim().is_empty() && self.name.trim().is_empty() {
            return Err(MetricsError::MissingInput {
                player: "<unnamed>".into(),
                reason: "player has neither a steam id nor a name".into(),
            });
        }

        let kast_fields = [
            ("kast", Some(self.kast)),
            ("kast_t", self.kast_t),
            ("kast_ct", self.kast_ct),
        ];
        for (field, value) in kast_fields {
            if let Some(v) = value {
                if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                    return Err(MetricsError::InvalidStat {
                        player: self.display_name().to_string(),
                        field: field.into(),
                        value: v,
                    });
                }
            }
        }

        let adr_fields = [
            ("adr", Some(self.adr)),
            ("adr_t", self.adr_t),
            ("adr_ct", self.adr_ct),
        ];
        for (field, value) in adr_fields {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(MetricsError::InvalidStat {
                        player: self.display_name().to_string(),
                        field: field.into(),
                        value: v,
                    });
                }
            }
        }

        Ok(())
    }

    /// The key used to look the player up in the role table and to identify
    /// them in output: the steam id when present, otherwise the name.
    pub fn player_key(&self) -> &str {
        if self.steam_id.trim().is_empty() {
            self.name.trim()
        } else {
            self.steam_id.trim()
        }
    }

    /// Name for logs and error messages.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.steam_id.trim()
        } else {
            self.name.trim()
        }
    }

    /// A copy of these stats with ADR and KAST replaced by one side's values.
    ///
    /// Returns `None` unless both side-specific values are present.
    pub fn for_side(&self, side: Side) -> Option<RawPlayerStats> {
        let (adr, kast) = match side {
            Side::T => (self.adr_t?, self.kast_t?),
            Side::CT => (self.adr_ct?, self.kast_ct?),
        };
        Some(RawPlayerStats {
            adr,
            kast,
            ..self.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Role table rows
// ---------------------------------------------------------------------------

/// Leadership flag and side roles for one player, as assigned by the
/// external role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub is_igl: bool,
    pub t_role: Role,
    pub ct_role: Role,
}

// ---------------------------------------------------------------------------
// Round data
// ---------------------------------------------------------------------------

/// How a team bought into a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyType {
    FullEco,
    SemiEco,
    SemiBuy,
    FullBuy,
    Unknown,
}

impl BuyType {
    /// Parse the demo parser's buy-type label. Unrecognized labels are
    /// `Unknown` and count toward no economy bucket.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "full eco" | "eco" => BuyType::FullEco,
            "semi-eco" | "semi eco" => BuyType::SemiEco,
            "semi-buy" | "semi buy" | "force" | "force buy" => BuyType::SemiBuy,
            "full buy" => BuyType::FullBuy,
            _ => BuyType::Unknown,
        }
    }

    /// Eco and force rounds: the buys that are expected to lose.
    pub fn is_eco_or_force(&self) -> bool {
        matches!(self, BuyType::FullEco | BuyType::SemiEco | BuyType::SemiBuy)
    }
}

/// One round of one map, from the round-level export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundData {
    pub round_num: u32,
    pub ct_team: String,
    pub t_team: String,
    pub winner_team: String,
    pub ct_buy_type: BuyType,
    pub t_buy_type: BuyType,
    pub ct_equip_value: u32,
    pub t_equip_value: u32,
    /// Side that held a 5v4 man advantage during the round, if any.
    pub advantage_5v4: Option<Side>,
}

impl RoundData {
    /// Which side `team` played this round, if it played at all.
    pub fn side_of(&self, team: &str) -> Option<Side> {
        if self.ct_team == team {
            Some(Side::CT)
        } else if self.t_team == team {
            Some(Side::T)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized metrics
// ---------------------------------------------------------------------------

/// Metric name to value, ordered by name so iteration (and therefore
/// floating-point summation order) is deterministic.
///
/// Two consumers read this map differently: weighted sums treat a missing or
/// non-finite entry as 0 ([`NormalizedMetrics::value`]), while display code
/// skips such entries entirely ([`NormalizedMetrics::display_entries`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedMetrics(BTreeMap<String, f64>);

impl NormalizedMetrics {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Raw lookup, including non-finite values.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value for weighted math: missing or non-finite entries count as 0.
    pub fn value(&self, name: &str) -> f64 {
        match self.0.get(name) {
            Some(v) if v.is_finite() => *v,
            _ => 0.0,
        }
    }

    /// Entries suitable for charts and tables: non-finite values are omitted.
    pub fn display_entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`; on key collisions `other` wins.
    pub fn extend(&mut self, other: NormalizedMetrics) {
        self.0.extend(other.0);
    }
}

impl FromIterator<(String, f64)> for NormalizedMetrics {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Role-dependent headline stat shown next to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryMetric {
    pub name: String,
    pub value: f64,
}

/// Which PIV formula produced a score. Scores from different modes live on
/// different scales and must not be ranked together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivMode {
    /// Learned weighted sum with role multiplier; static fallback formula
    /// when no weights are available. Range [0, 10].
    Weighted,
    /// Lightweight multiplicative formula. Range [0, 1].
    Legacy,
    /// RCS x ICF x SC x OSM x basic score x role weight. Range [0, 10].
    Composite,
}

impl PivMode {
    pub fn from_str_mode(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "weighted" => Some(PivMode::Weighted),
            "legacy" => Some(PivMode::Legacy),
            "composite" => Some(PivMode::Composite),
            _ => None,
        }
    }

    /// Inclusive upper clamp for this mode's scores.
    pub fn ceiling(&self) -> f64 {
        match self {
            PivMode::Weighted | PivMode::Composite => 10.0,
            PivMode::Legacy => 1.0,
        }
    }
}

/// A player scored by the PIV engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWithPiv {
    pub id: String,
    pub name: String,
    pub team: String,
    pub role: Role,
    pub t_role: Role,
    pub ct_role: Role,
    pub is_igl: bool,
    pub mode: PivMode,
    pub piv: f64,
    pub t_piv: Option<f64>,
    pub ct_piv: Option<f64>,
    pub kd: f64,
    pub primary_metric: PrimaryMetric,
    pub raw_stats: RawPlayerStats,
    pub metrics: NormalizedMetrics,
}

impl PlayerWithPiv {
    /// PIV as the dashboard shows it: scaled by 100 and rounded.
    pub fn display_piv(&self) -> i64 {
        (self.piv * 100.0).round() as i64
    }
}

/// A roster aggregated into a Team Impact Rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithTir {
    pub name: String,
    pub players: Vec<PlayerWithPiv>,
    pub tir: f64,
    pub synergy_factor: f64,
    pub sum_piv: f64,
    pub avg_piv: f64,
    pub top_player_name: String,
    pub top_player_piv: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
