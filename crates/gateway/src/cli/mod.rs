pub mod chat;
pub mod config;

use clap::{Parser, Subcommand};

/// pixagent — a conversational photo-search agent.
#[derive(Debug, Parser)]
#[command(name = "pixagent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/SSE server (default when no subcommand is given).
    Serve,
    /// Chat with the agent in the terminal.
    Chat,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `PX_CONFIG` (or `config.toml`
/// by default). A missing file yields the defaults. Returns the parsed
/// config and the path that was used.
pub fn load_config() -> anyhow::Result<(px_domain::config::Config, String)> {
    let config_path = std::env::var("PX_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        px_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["pixagent"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::parse_from(["pixagent", "config", "validate"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Validate))
        ));
    }
}
