//! Command-line interface

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "feedsift-server")]
#[command(about = "Stream feed updates that match a free-text prompt", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server
    Serve(ServeArgs),

    /// Validate a configuration file and exit
    CheckConfig {
        /// Configuration file path
        #[arg(short, long, default_value = "config.yaml", env = "FEEDSIFT_CONFIG")]
        config: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml", env = "FEEDSIFT_CONFIG")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Classifier API base URL
    #[arg(long, env = "FEEDSIFT_CLASSIFIER_ENDPOINT")]
    pub classifier_endpoint: Option<String>,

    /// Classifier API key
    #[arg(long, env = "FEEDSIFT_CLASSIFIER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from([
            "feedsift-server",
            "serve",
            "--config",
            "feeds.yaml",
            "--port",
            "9000",
        ]);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.config, "feeds.yaml");
                assert_eq!(args.port, Some(9000));
                assert!(args.listen.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config_verbose() {
        let cli = Cli::parse_from(["feedsift-server", "check-config", "-c", "x.yaml", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::CheckConfig { config } if config == "x.yaml"));
    }
}
