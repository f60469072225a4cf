//! Scheduler command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;
use tracing::warn;
use vaultkeep_backup::Engine;

use super::load_config;
use crate::output;

#[derive(Args, Debug)]
pub struct SchedulerArgs {}

pub async fn run(_args: SchedulerArgs, config_path: &Utf8Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config);

    output::info(&format!(
        "Scheduling backups of {} every {}; press Ctrl-C to stop",
        config.data_dir(),
        output::format_duration(config.schedule_interval())
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stats = engine.run_scheduler(shutdown).await?;

    output::success(&format!(
        "Scheduler stopped after {} runs ({} succeeded, {} failed, {} skipped)",
        stats.runs(),
        stats.succeeded,
        stats.failed,
        stats.skipped
    ));
    Ok(())
}
