// Role enumeration and the role classifier.
//
// Two role vocabularies have been in use ("AWPer"/"Entry Fragger"/"Rifler"
// alongside the canonical labels); both parse into the single `Role` enum
// through an alias table. Anything unrecognized becomes `Support`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{RawPlayerStats, RoleInfo};

// ---------------------------------------------------------------------------
// Role enum
// ---------------------------------------------------------------------------

/// Canonical CS2 player roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    IGL,
    AWP,
    Entry,
    Support,
    Lurker,
    Spacetaker,
    Anchor,
    Rotator,
}

/// Every canonical role, in display order.
pub const ALL_ROLES: [Role; 8] = [
    Role::IGL,
    Role::AWP,
    Role::Entry,
    Role::Support,
    Role::Lurker,
    Role::Spacetaker,
    Role::Anchor,
    Role::Rotator,
];

impl Role {
    /// Parse a role label, accepting canonical names and legacy aliases
    /// case-insensitively. Returns `None` for unknown labels.
    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "igl" | "in-game leader" | "ingame leader" => Some(Role::IGL),
            "awp" | "awper" => Some(Role::AWP),
            "entry" | "entry fragger" | "opener" => Some(Role::Entry),
            "support" => Some(Role::Support),
            "lurker" => Some(Role::Lurker),
            "spacetaker" => Some(Role::Spacetaker),
            "anchor" => Some(Role::Anchor),
            "rotator" | "rifler" => Some(Role::Rotator),
            _ => None,
        }
    }

    /// Parse a role label, falling back to `Support` for unknown labels.
    pub fn parse(s: &str) -> Self {
        Role::from_str_role(s).unwrap_or_else(|| {
            if !s.trim().is_empty() {
                warn!("unknown role label '{}', treating as Support", s.trim());
            }
            Role::Support
        })
    }

    /// Canonical label; also the suffix of the `role_<label>` weight key.
    pub fn display_str(&self) -> &'static str {
        match self {
            Role::IGL => "IGL",
            Role::AWP => "AWP",
            Role::Entry => "Entry",
            Role::Support => "Support",
            Role::Lurker => "Lurker",
            Role::Spacetaker => "Spacetaker",
            Role::Anchor => "Anchor",
            Role::Rotator => "Rotator",
        }
    }

    /// Key of this role's multiplier in a learned weight set.
    pub fn weight_key(&self) -> String {
        format!("role_{}", self.display_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::parse(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.display_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// AWP kills as a share of all kills at or above which a player with no
/// role-table entry is treated as the team's AWPer.
pub const AWP_KILL_SHARE_THRESHOLD: f64 = 0.35;

/// Opening duels (entry kills + entry deaths) per round at or above which a
/// player with no role-table entry is treated as an entry.
pub const ENTRY_DUEL_RATE_THRESHOLD: f64 = 0.20;

/// Result of role classification for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Labeled role: `IGL` for in-game leaders, otherwise the T-side role.
    pub role: Role,
    pub t_role: Role,
    pub ct_role: Role,
    pub is_igl: bool,
}

/// Classify a player from the role table, or infer a role from their stats
/// when the table has no entry.
pub fn classify(stats: &RawPlayerStats, role_info: Option<&RoleInfo>) -> Classification {
    match role_info {
        Some(info) => Classification {
            role: primary_role(info.t_role, info.is_igl),
            t_role: info.t_role,
            ct_role: info.ct_role,
            is_igl: info.is_igl,
        },
        None => {
            let t_role = infer_t_role(stats);
            let ct_role = if t_role == Role::AWP {
                Role::AWP
            } else {
                Role::Rotator
            };
            Classification {
                role: t_role,
                t_role,
                ct_role,
                is_igl: false,
            }
        }
    }
}

/// The labeled role: leadership outranks the T-side role.
pub fn primary_role(t_role: Role, is_igl: bool) -> Role {
    if is_igl {
        Role::IGL
    } else {
        t_role
    }
}

/// Conservative T-role inference: Support unless the stats clearly show an
/// AWPer or an entry.
pub fn infer_t_role(stats: &RawPlayerStats) -> Role {
    if stats.kills > 0 {
        let awp_share = stats.awp_kills as f64 / stats.kills as f64;
        if awp_share >= AWP_KILL_SHARE_THRESHOLD {
            return Role::AWP;
        }
    }
    if stats.rounds_played > 0 {
        let duel_rate =
            (stats.entry_kills + stats.entry_deaths) as f64 / stats.rounds_played as f64;
        if duel_rate >= ENTRY_DUEL_RATE_THRESHOLD {
            return Role::Entry;
        }
    }
    Role::Support
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
