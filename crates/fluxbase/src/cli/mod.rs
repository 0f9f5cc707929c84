mod migrate;
mod procedures;
mod serve;

pub use migrate::MigrateCommand;
pub use procedures::ProceduresCommand;
pub use serve::ServeCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// fluxbase — a single-binary, PostgreSQL-backed request execution plane.
#[derive(Parser)]
#[command(name = "fluxbase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway, connection broker, and scheduler.
    Serve(ServeCommand),

    /// Check that the configured database has the schema fluxbase expects.
    Migrate(MigrateCommand),

    /// Manage stored procedures.
    Procedures(ProceduresCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(cmd) => cmd.execute().await,
            Commands::Migrate(cmd) => cmd.execute().await,
            Commands::Procedures(cmd) => cmd.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve() {
        let cli = Cli::try_parse_from(["fluxbase", "serve"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn parses_migrate() {
        let cli = Cli::try_parse_from(["fluxbase", "migrate"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn parses_procedures_sync() {
        let cli = Cli::try_parse_from(["fluxbase", "procedures", "sync", "--dir", "procedures"]);
        assert!(cli.is_ok());
    }
}
