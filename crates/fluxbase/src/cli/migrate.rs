//! Preflight schema check.
//!
//! The internal schemas (`auth`, `rpc`, `storage`, `admin`, `api`,
//! `branching`) are owned and migrated by a separate tool external to this
//! core; `fluxbase` only depends on their shape. `fluxbase migrate` does not
//! create or alter schema — it connects with the configured credentials and
//! reports which tables the runtime depends on are present, so a deployment
//! error (wrong database, migrations not yet run) is caught before `serve`
//! starts routing traffic.

use anyhow::Result;
use clap::Parser;
use console::style;

use fluxbase_core::config::FluxbaseConfig;
use fluxbase_runtime::schema::SchemaInspector;
use fluxbase_runtime::Database;

/// Tables the runtime reads or writes directly, grouped by the schema that
/// owns them.
const REQUIRED_TABLES: &[(&str, &str)] = &[
    ("auth", "users"),
    ("auth", "refresh_tokens"),
    ("auth", "credentials"),
    ("auth", "mfa_secrets"),
    ("auth", "replay_tokens"),
    ("rpc", "procedures"),
    ("rpc", "executions"),
];

/// Check that the configured database has the schema fluxbase expects.
#[derive(Parser)]
pub struct MigrateCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "fluxbase.toml")]
    pub config: String,
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let config_path = std::path::Path::new(&self.config);
        let config = if config_path.exists() {
            FluxbaseConfig::from_file(config_path)?
        } else {
            FluxbaseConfig::from_env()?
        };

        println!();
        println!("  {} schema preflight", style("fluxbase").bold().cyan());
        println!();

        let db = Database::from_config(&config.database).await?;
        let inspector = SchemaInspector::new(db.pool().clone());

        let mut missing = Vec::new();
        for (schema, table) in REQUIRED_TABLES {
            match inspector.describe_table(schema, table).await {
                Ok(_) => println!("  {} {}.{}", style("✓").green(), schema, table),
                Err(_) => {
                    println!("  {} {}.{} (missing)", style("✗").red(), schema, table);
                    missing.push(format!("{schema}.{table}"));
                }
            }
        }

        println!();
        if missing.is_empty() {
            println!("  {} all required tables present", style("✓").green());
            Ok(())
        } else {
            anyhow::bail!(
                "missing {} required table(s): {}. These schemas are owned by the platform's \
                 migration tool, outside this binary; run it against this database before \
                 `fluxbase serve`.",
                missing.len(),
                missing.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_tables_cover_every_schema_the_runtime_depends_on() {
        let schemas: std::collections::HashSet<&str> =
            REQUIRED_TABLES.iter().map(|(schema, _)| *schema).collect();
        assert!(schemas.contains("auth"));
        assert!(schemas.contains("rpc"));
    }
}
