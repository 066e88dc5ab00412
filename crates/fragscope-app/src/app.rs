// Scoring run orchestration: load inputs, resolve weights, score players,
// aggregate teams, assemble the report.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use fragscope_core::{
    compute_players, compute_teams, RawPlayerStats, RoleInfo, RoundData, ScoringContext,
    WeightsSnapshot,
};
use tracing::info;

use crate::config::Config;
use crate::data::CsvDataSource;
use crate::report::Report;
use crate::weights_source::WeightsCache;

/// Raw inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct ScoringInputs {
    pub players: Vec<RawPlayerStats>,
    pub roles: BTreeMap<String, RoleInfo>,
    pub rounds: Vec<RoundData>,
}

impl ScoringInputs {
    /// Read all inputs from the configured CSV paths.
    pub fn load(source: &CsvDataSource) -> anyhow::Result<Self> {
        let players = source
            .fetch_raw_players()
            .context("failed to load player stats")?;
        let roles = source.fetch_roles().context("failed to load role table")?;
        let rounds = source.fetch_rounds().context("failed to load round data")?;
        Ok(Self {
            players,
            roles,
            rounds,
        })
    }
}

/// Score players and teams and build the report. Pure apart from logging.
pub fn score(
    inputs: ScoringInputs,
    weights: Option<&WeightsSnapshot>,
    config: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<Report> {
    let ctx = ScoringContext {
        mode: config.mode,
        rounds: inputs.rounds,
        osm: None,
        synergy: config.synergy,
    };

    let players = compute_players(&inputs.players, &inputs.roles, weights, &ctx)
        .context("failed to score players")?;
    let teams = compute_teams(&players, &config.synergy).context("failed to aggregate teams")?;
    info!(
        "scored {} players across {} teams ({:?} mode)",
        players.len(),
        teams.len(),
        config.mode
    );

    Ok(Report::new(now, config.mode, weights, players, teams))
}

/// Full run: read inputs, fetch weights through the cache, score, and
/// return the report.
pub async fn run(config: &Config, cache: &WeightsCache, now: DateTime<Utc>) -> anyhow::Result<Report> {
    let source = CsvDataSource::new(config.data_paths.clone());
    let inputs = ScoringInputs::load(&source)?;
    let weights = cache.get_weights(now).await;
    score(inputs, weights.as_deref(), config, now)
}
