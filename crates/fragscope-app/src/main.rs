// fragscope entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config, copying defaults on first run
// 3. Build the weights cache for the configured source
// 4. Load inputs, score players and teams
// 5. Write the JSON report

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use fragscope_app::app;
use fragscope_app::config;
use fragscope_app::weights_source::WeightsCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("fragscope starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: mode={:?}, weights source={:?}, players={}",
        config.mode, config.weights.source, config.data_paths.players
    );

    // 3. Weights cache
    let cache = WeightsCache::from_config(&config).context("failed to set up weights source")?;

    // 4. Score
    let report = app::run(&config, &cache, Utc::now())
        .await
        .context("scoring run failed")?;

    // 5. Write report
    let out = Path::new(&config.output.report_path);
    report
        .write_to(out, config.output.pretty)
        .context("failed to write report")?;
    info!(
        "Wrote report for {} players and {} teams to {}",
        report.players.len(),
        report.teams.len(),
        out.display()
    );
    println!("{}", out.display());

    Ok(())
}

/// Initialize tracing to write to a log file.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("fragscope.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("fragscope=info,fragscope_app=info,fragscope_core=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
