// Wedding Registry - admin CLI
// Seed, bulk-load, inspect and export the registry without the web server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wedding_registry::config::DB_PATH_VAR;
use wedding_registry::{
    list_rsvps, read_registry_list_rows, read_registry_rows, write_contributions_csv,
    write_registry_csv, write_rsvps_csv, Config, Ledger, Store,
};

#[derive(Parser)]
#[command(name = "wedding-registry", about = "Wedding gift registry admin tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file (defaults to $WEDDING_DB_PATH, then wedding.db)
    #[arg(long, global = true, env = DB_PATH_VAR)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the registry with the default items
    Seed,
    /// Replace the registry from a CSV with contributions
    /// (Item_name, Link, Total, Contributor, Amount, Timestamp)
    Import { csv: PathBuf },
    /// Replace the registry from an items-only CSV (Item, Link, Total)
    ImportItems { csv: PathBuf },
    /// Print the registry
    List,
    /// Write a CSV export to stdout
    Export {
        #[arg(value_enum, default_value = "contributions")]
        kind: ExportKind,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ExportKind {
    /// One row per contribution
    Contributions,
    /// Re-uploadable registry snapshot
    Registry,
    /// Guest RSVPs
    Rsvps,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => Config::default().db_path,
    };

    let store = Store::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let ledger = Ledger::new(store.clone());

    match cli.command {
        Command::Seed => {
            let count = ledger.seed_defaults()?;
            println!("✓ Registry seeded with {} items", count);
        }
        Command::Import { csv } => {
            let file = File::open(&csv).with_context(|| format!("Failed to open {}", csv.display()))?;
            let rows = read_registry_rows(BufReader::new(file))
                .with_context(|| format!("Failed to parse {}", csv.display()))?;
            let summary = ledger.bulk_load_with_contributions(&rows)?;
            println!(
                "✓ Registry replaced: {} items, {} contributions",
                summary.items_count, summary.total_contributions
            );
        }
        Command::ImportItems { csv } => {
            let file = File::open(&csv).with_context(|| format!("Failed to open {}", csv.display()))?;
            let rows = read_registry_list_rows(BufReader::new(file))
                .with_context(|| format!("Failed to parse {}", csv.display()))?;
            let count = ledger.bulk_load_items_only(&rows)?;
            println!("✓ Registry replaced: {} items", count);
        }
        Command::List => {
            let items = ledger.list_items()?;
            if items.is_empty() {
                println!("Registry is empty");
            }
            for item in items {
                println!(
                    "{:<24} {:>10.2} / {:<10.2} ({} contributions){}",
                    item.id,
                    item.contributed,
                    item.total,
                    item.contributions.len(),
                    if item.is_fully_funded() { " ✓ funded" } else { "" }
                );
                for (index, contribution) in item.contributions.iter().enumerate() {
                    println!(
                        "    [{}] {:<20} {:>10.2}  {}",
                        index,
                        contribution.contributor_name,
                        contribution.amount,
                        contribution.timestamp.to_rfc3339()
                    );
                }
            }
        }
        Command::Export { kind } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            match kind {
                ExportKind::Contributions => write_contributions_csv(&ledger.list_items()?, &mut out)?,
                ExportKind::Registry => write_registry_csv(&ledger.list_items()?, &mut out)?,
                ExportKind::Rsvps => write_rsvps_csv(&list_rsvps(&store)?, &mut out)?,
            }
            out.flush()?;
        }
    }

    drop(ledger);
    store.close()?;

    Ok(())
}
