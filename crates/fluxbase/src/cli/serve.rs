use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;

use fluxbase_core::config::FluxbaseConfig;

use crate::runtime::Fluxbase;

/// Run the fluxbase gateway.
#[derive(Parser)]
pub struct ServeCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "fluxbase.toml")]
    pub config: String,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    /// Execute the serve command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        tracing_subscriber::fmt()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
            .init();

        println!();
        println!("  {} v{}", style("fluxbase").bold().cyan(), env!("CARGO_PKG_VERSION"));
        println!();

        let config_path = std::path::Path::new(&self.config);
        let mut config = if config_path.exists() {
            info!("loading configuration from {}", self.config);
            FluxbaseConfig::from_file(config_path)?
        } else {
            info!("no config file at {}, building from FLUXBASE_* environment", self.config);
            FluxbaseConfig::from_env()?
        };

        if let Some(port) = self.port {
            config.gateway.port = port;
        }

        println!(
            "  {} listening on {}",
            style("→").dim(),
            style(format!("http://0.0.0.0:{}", config.gateway.port)).cyan()
        );
        println!();

        let fluxbase = Fluxbase::builder()
            .config(config)
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        fluxbase.serve().await.map_err(|e| anyhow::anyhow!("{}", e))?;

        println!("  {} goodbye", style("✓").green());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_command_defaults() {
        let cmd = ServeCommand {
            config: "fluxbase.toml".to_string(),
            port: None,
        };
        assert_eq!(cmd.config, "fluxbase.toml");
        assert!(cmd.port.is_none());
    }
}
