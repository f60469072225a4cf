//! Prune command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;
use dialoguer::Confirm;
use vaultkeep_backup::{retention, Engine};

use super::load_config;
use crate::output;

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Show what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub fn run(args: PruneArgs, config_path: &Utf8Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config);
    let policy = &engine.settings().retention;

    let artifacts = engine.list()?;
    let plan = retention::select(policy, &artifacts);

    if plan.delete.is_empty() {
        output::success(&format!("Nothing to prune; {} backups kept", plan.keep.len()));
        return Ok(());
    }

    output::header("Backups to delete");
    for artifact in &plan.delete {
        output::kv(&artifact.id.to_string(), artifact.path.as_str());
    }

    if args.dry_run {
        output::info(&format!(
            "Dry run: {} would be kept, {} deleted",
            plan.keep.len(),
            plan.delete.len()
        ));
        return Ok(());
    }

    if !args.yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Delete {} backups?", plan.delete.len()))
            .default(false)
            .interact()?;
        if !proceed {
            output::info("Prune cancelled");
            return Ok(());
        }
    }

    let report = engine.prune()?;
    if report.failed.is_empty() {
        output::success(&format!(
            "Deleted {} backups, kept {}",
            report.deleted.len(),
            report.kept
        ));
    } else {
        output::warning(&format!(
            "Deleted {} backups, {} could not be deleted",
            report.deleted.len(),
            report.failed.len()
        ));
    }
    if report.plain_copies_removed > 0 {
        output::info(&format!(
            "Removed {} unencrypted copies of encrypted backups",
            report.plain_copies_removed
        ));
    }
    Ok(())
}
