use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use client_core::DEFAULT_COLLECTION_KEY;
use shared::domain::CatalogItem;
use storage::{DurableKv, Storage, DEFAULT_DATABASE_URL};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every stored key with its size and last write time.
    Inspect,
    /// Print a stored collection as pretty JSON, or write it to `--out`.
    Export {
        #[arg(long, default_value = DEFAULT_COLLECTION_KEY)]
        key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    ResetCollection {
        #[arg(long, default_value = DEFAULT_COLLECTION_KEY)]
        key: String,
    },
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Inspect => inspect(&storage, &mut stdout).await?,
        Command::Export { key, out } => {
            let json = export_collection(&storage, &key).await?;
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write '{}'", path.display()))?;
                    info!(key = %key, path = %path.display(), "exported collection");
                }
                None => writeln!(stdout, "{json}")?,
            }
        }
        Command::ResetCollection { key } => {
            if storage.delete(&key).await? {
                writeln!(stdout, "reset collection '{key}'")?;
            } else {
                writeln!(stdout, "no collection stored under '{key}'")?;
            }
        }
        Command::Check => {
            storage.health_check().await?;
            writeln!(stdout, "ok {}", cli.database_url)?;
        }
    }

    Ok(())
}

async fn inspect(storage: &Storage, out: &mut impl Write) -> Result<()> {
    let entries = storage.list_entries().await?;
    if entries.is_empty() {
        writeln!(out, "(no stored entries)")?;
    }
    for entry in entries {
        writeln!(
            out,
            "{:<24} {:>8} B  {}",
            entry.key,
            entry.size_bytes,
            entry.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
    }
    Ok(())
}

async fn export_collection(storage: &Storage, key: &str) -> Result<String> {
    let Some(bytes) = storage.get(key).await? else {
        return Ok("[]".to_string());
    };
    match serde_json::from_slice::<Vec<CatalogItem>>(&bytes) {
        Ok(items) => Ok(serde_json::to_string_pretty(&items)?),
        Err(err) => {
            warn!(key, error = %err, "stored collection is malformed, exporting raw bytes");
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
