//! CLI module for labrelay
//!
//! Command-line parsing for the `labrelay-server` binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// labrelay - coordination server for research agents
#[derive(Parser, Debug)]
#[command(
    name = "labrelay-server",
    version,
    about = "labrelay - coordination server for research agents",
    long_about = "Routes research tasks between gateways and capability-declaring agents over WebSocket.\n\n\
                  Run without arguments to start the server, or use 'init' to scaffold a config file.",
    after_help = "EXAMPLES:\n    \
                  labrelay-server init                 # Write labrelay.toml and .env.example\n    \
                  labrelay-server                      # Start the server (reads labrelay.toml)\n    \
                  labrelay-server --port 9000 --watch  # Custom port with config hot reload\n    \
                  labrelay-server config --validate    # Check the configuration file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "labrelay.toml", global = true)]
    pub config: PathBuf,

    /// Override the bind address from the config file
    #[arg(long, env = "LABRELAY_HOST")]
    pub host: Option<String>,

    /// Override the port from the config file
    #[arg(short, long, env = "LABRELAY_PORT")]
    pub port: Option<u16>,

    /// Reload the configuration file when it changes
    #[arg(short, long)]
    pub watch: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter labrelay.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,

        /// AI providers to configure (comma-separated: ollama, openai, anthropic, xai)
        #[arg(long, default_value = "ollama", value_delimiter = ',')]
        providers: Vec<String>,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file and exit
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
