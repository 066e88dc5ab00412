// Error types for the impact pipeline.
//
// Only structural problems are errors. Numeric edge cases (zero deaths, NaN
// metrics) are substituted where they occur, missing weights select the
// fallback formula, and unknown role labels fall back to Support; none of
// those reach this enum.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("missing input for {player}: {reason}")]
    MissingInput { player: String, reason: String },

    #[error("invalid value for `{field}` on {player}: {value}")]
    InvalidStat {
        player: String,
        field: String,
        value: f64,
    },

    #[error("cannot aggregate team `{team}`: roster is empty")]
    EmptyRoster { team: String },
}
