//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG: &str = "edgetel.json5";

/// Command-line arguments for the agent.
#[derive(Parser, Debug, Clone)]
#[command(name = "edgetel-agent", version, about = "Edge telemetry agent")]
pub struct AgentArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl AgentArgs {
    /// Parse CLI arguments from the process arguments.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
