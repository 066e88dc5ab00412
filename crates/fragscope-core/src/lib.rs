// Core impact metrics: role classification, metric normalization, PIV and
// TIR. Pure computation; all I/O lives in fragscope-app.

pub mod economy;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod piv;
pub mod roles;
pub mod team;
pub mod weights;

pub use error::MetricsError;
pub use model::{
    NormalizedMetrics, PivMode, PlayerWithPiv, RawPlayerStats, RoleInfo, RoundData, TeamWithTir,
};
pub use pipeline::{compute_players, ScoringContext};
pub use piv::compute_piv;
pub use roles::Role;
pub use team::{aggregate_team, compute_teams, SynergyConfig};
pub use weights::{WeightsResponse, WeightsSnapshot};
