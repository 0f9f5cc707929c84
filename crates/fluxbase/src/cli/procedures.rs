use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;

use fluxbase_core::config::FluxbaseConfig;
use fluxbase_runtime::procedure::{sync_from_directory, ProcedureStore};
use fluxbase_runtime::Database;

/// Manage stored procedures.
#[derive(Parser)]
pub struct ProceduresCommand {
    #[command(subcommand)]
    pub action: ProceduresAction,
}

#[derive(Subcommand)]
pub enum ProceduresAction {
    /// Sync the procedures directory into storage.
    Sync {
        /// Directory to scan (overrides `procedure.procedures_dir`).
        #[arg(short, long)]
        dir: Option<String>,

        /// Keep procedures present in storage but absent from the
        /// directory, instead of deleting them.
        #[arg(long)]
        keep: bool,

        /// Configuration file path.
        #[arg(short, long, default_value = "fluxbase.toml")]
        config: String,
    },
}

impl ProceduresCommand {
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        match self.action {
            ProceduresAction::Sync { dir, keep, config } => sync(dir, keep, config).await,
        }
    }
}

async fn sync(dir: Option<String>, keep: bool, config_path: String) -> Result<()> {
    let config_path = std::path::Path::new(&config_path);
    let config = if config_path.exists() {
        FluxbaseConfig::from_file(config_path)?
    } else {
        FluxbaseConfig::from_env()?
    };

    let dir = dir.unwrap_or(config.procedure.procedures_dir);
    let root = std::path::Path::new(&dir);

    println!();
    println!("  {} syncing {}", style("fluxbase").bold().cyan(), dir);
    println!();

    let db = Database::from_config(&config.database).await?;
    let store = ProcedureStore::load(db.pool().clone()).await?;
    let report = sync_from_directory(&store, root, keep).await?;

    for (namespace, name) in &report.inserted {
        println!("  {} inserted {}/{}", style("+").green(), namespace, name);
    }
    for (namespace, name) in &report.updated {
        println!("  {} updated {}/{}", style("~").yellow(), namespace, name);
    }
    for (namespace, name) in &report.deleted {
        println!("  {} deleted {}/{}", style("-").red(), namespace, name);
    }

    println!();
    println!(
        "  {} {} inserted, {} updated, {} deleted, {} unchanged",
        style("✓").green(),
        report.inserted.len(),
        report.updated.len(),
        report.deleted.len(),
        report.unchanged
    );
    println!();

    Ok(())
}
