use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::DesignConfig;

mod candidates;
mod config;
mod data_handling;
mod errors;
mod helper_functions;
mod measurements;
mod models;
mod pipeline;
mod record;
mod selection;
mod tools;

fn main() -> anyhow::Result<()> {
    // Setup logging and project configuration
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the probe design pipeline");

    let config_path = helper_functions::config_path();
    let cfg = DesignConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(
        "selector '{}', windows of {} stepping {}, probes of {} stepping {}",
        cfg.selection.selector,
        cfg.selection.window_length,
        cfg.selection.window_step,
        cfg.probe.length,
        cfg.probe.step
    );

    let report = pipeline::run(&cfg)?;

    info!(
        "done: {} probes from {} records ({} ineligible, {} malformed)",
        report.winners, report.records, report.ineligible, report.malformed
    );
    Ok(())
}
