//! List command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;
use tabled::{settings::Style as TableStyle, Table, Tabled};
use vaultkeep_backup::Engine;

use super::load_config;
use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled, serde::Serialize)]
struct BackupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Size")]
    #[serde(skip)]
    size: String,
    #[tabled(skip)]
    size_bytes: u64,
    #[tabled(rename = "Encrypted")]
    encrypted: bool,
    #[tabled(rename = "Path")]
    path: String,
}

pub fn run(args: ListArgs, config_path: &Utf8Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config);
    let artifacts = engine.list()?;

    let rows: Vec<BackupRow> = artifacts
        .iter()
        .map(|a| BackupRow {
            id: a.id.to_string(),
            created: a.id.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
            size: output::format_bytes(a.size_bytes),
            size_bytes: a.size_bytes,
            encrypted: a.encrypted,
            path: a.path.to_string(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        output::info(&format!("No backups in {}", config.destination()));
        return Ok(());
    }

    output::header(&format!("Backups in {}", config.destination()));
    println!("{}", Table::new(&rows).with(TableStyle::rounded()));
    Ok(())
}
