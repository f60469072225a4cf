//! Restore command

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use dialoguer::Confirm;
use vaultkeep_backup::{Confirmer, Engine, Error, RestoreRequest, RestoreSummary};

use super::load_config;
use crate::output;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup to restore: an id such as 20240110T020000, a file name, or "latest"
    #[arg(long)]
    pub backup_id: String,

    /// Restore into this directory instead of the configured data directory
    #[arg(long)]
    pub target_dir: Option<Utf8PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Interactive yes/no prompt; a failed prompt counts as "no"
struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&self, summary: &RestoreSummary) -> bool {
        output::header("Restore Summary");
        output::kv("Backup", &summary.backup_id);
        output::kv("Size", &output::format_bytes(summary.size_bytes));
        output::kv("Encrypted", if summary.encrypted { "yes" } else { "no" });
        output::kv("Container", &summary.container);
        output::kv("Target", summary.target_dir.as_str());
        println!();
        output::warning(&format!(
            "Everything in {} will be deleted and replaced",
            summary.target_dir
        ));

        Confirm::new()
            .with_prompt("Proceed with restore?")
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

pub async fn run(args: RestoreArgs, config_path: &Utf8Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config);

    let mut request = RestoreRequest::new(args.backup_id).with_skip_confirmation(args.yes);
    if let Some(target) = args.target_dir {
        request = request.with_target_dir(target);
    }

    match engine.run_restore(&request, &PromptConfirmer).await {
        Ok(report) => {
            output::success(&format!(
                "Restored {} into {}",
                report.artifact.id, report.target_dir
            ));
            if let Some(ownership) = report.ownership {
                if ownership.failures > 0 {
                    output::warning(&format!(
                        "Ownership could not be set on {} entries",
                        ownership.failures
                    ));
                }
            }
            output::kv("Duration", &output::format_duration(report.duration));
            Ok(())
        }
        Err(Error::ConfirmationDeclined) => {
            output::info("Restore cancelled");
            Ok(())
        }
        Err(e) => {
            output::error(&format!("Restore failed: {}", e));
            Err(e.into())
        }
    }
}
