use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use gaz_adapters::{source_for_table, HttpApi, HttpClientConfig};
use gaz_storage::MemoryStore;
use gaz_sync::{run_table_sync, TableLocks, TableRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gaz-cli")]
#[command(about = "Gazetteer location sync command-line interface")]
struct Cli {
    /// Source table registry.
    #[arg(long, global = true, default_value = "tables.yaml")]
    registry: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one synchronization pass for a registered table.
    Sync {
        table: String,
        /// Store snapshot, read before and rewritten after the pass.
        #[arg(long, default_value = "gazetteer.json")]
        store: PathBuf,
    },
    /// List the registered source tables.
    Tables,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let registry = TableRegistry::load(&cli.registry)?;

    match cli.command {
        Commands::Sync {
            table,
            store: store_path,
        } => {
            let Some(table) = registry.table(&table) else {
                bail!("table {table} is not in the registry");
            };
            let store = MemoryStore::open(store_path)?;
            let http = HttpApi::new(&HttpClientConfig::default())?;
            let source = source_for_table(&http, table);
            let locks = TableLocks::new();
            let report = run_table_sync(&store, &locks, source.as_ref(), table).await?;
            println!(
                "sync complete: run_id={} table={} created={} updated={} remapped={} skipped={} pairs={}",
                report.run_id,
                report.table,
                report.counts.created,
                report.counts.updated,
                report.counts.remapped,
                report.counts.skipped,
                report.pairs.len()
            );
        }
        Commands::Tables => {
            for table in &registry.tables {
                println!(
                    "{} (admin level {}: {}) <- {}",
                    table.name,
                    table.admin_level,
                    table.admin_level_name,
                    table.dataset_name()
                );
            }
        }
    }

    Ok(())
}
