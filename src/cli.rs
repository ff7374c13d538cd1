use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "weather-service", version, about = "Weather observation store and API")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Create the weather table and indexes, then exit
    Init,

    /// Append observations from a JSON array file
    Import {
        /// Path to a JSON file holding an array of observations
        file: PathBuf,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with secrets masked)
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };
        assert!(matches!(cli.get_command(), Commands::Start));
    }

    #[test]
    fn test_cli_parsing_import() {
        let cli = Cli::try_parse_from(["weather-service", "import", "batch.json"]).unwrap();
        match cli.get_command() {
            Commands::Import { file } => assert_eq!(file, PathBuf::from("batch.json")),
            other => panic!("Expected Import command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parsing_global_config() {
        let cli =
            Cli::try_parse_from(["weather-service", "init", "--config", "/etc/weather.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/weather.toml"));
        assert!(matches!(cli.get_command(), Commands::Init));
    }

    #[test]
    fn test_cli_parsing_config_validate() {
        let cli = Cli::try_parse_from(["weather-service", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.get_command(),
            Commands::Config {
                action: ConfigCommands::Validate
            }
        ));
    }
}
