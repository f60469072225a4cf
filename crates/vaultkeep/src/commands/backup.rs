//! Backup command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;
use vaultkeep_backup::Engine;

use super::load_config;
use crate::output;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Skip the retention pass summary in the output
    #[arg(long)]
    pub no_summary: bool,
}

pub async fn run(args: BackupArgs, config_path: &Utf8Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config);

    output::info(&format!(
        "Backing up {} from container {}",
        config.data_dir(),
        config.container_name()
    ));

    let spinner = output::spinner("Creating backup...");
    let result = engine.run_backup().await;
    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            output::error(&format!("Backup failed: {}", e));
            return Err(e.into());
        }
    };

    output::success(&format!("Backup created: {}", report.artifact.path));
    if report.degraded {
        output::warning("Encryption failed; the backup was kept unencrypted");
    }

    if args.no_summary {
        return Ok(());
    }

    output::header("Backup Summary");
    output::kv("ID", &report.artifact.id.to_string());
    output::kv("Size", &output::format_bytes(report.artifact.size_bytes));
    output::kv("Encrypted", if report.artifact.encrypted { "yes" } else { "no" });
    if let Some(checksum) = &report.checksum {
        output::kv("SHA-256", checksum);
    }
    output::kv("Duration", &output::format_duration(report.duration));
    match &report.retention {
        Some(retention) => {
            output::kv(
                "Retention",
                &format!(
                    "{} kept, {} deleted, {} failed",
                    retention.kept,
                    retention.deleted.len(),
                    retention.failed.len()
                ),
            );
        }
        None => output::warning("Retention could not be applied; see the log for details"),
    }

    Ok(())
}
