use crate::config::{CONFIG_FILE_ENV, DEFAULT_PORT};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Count structured log events into labeled counters and serve them for scraping
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// YAML metric configuration file
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    pub config: PathBuf,

    /// Job name, available to labels as the `job` default value
    #[arg(long)]
    pub job: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest events and serve the counters over HTTP until interrupted
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Newline-delimited JSON events to ingest (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT, env = "LOG_METRICS_PORT")]
        port: u16,

        /// Path the metrics are served under (default /metrics)
        #[arg(long, env = "LOG_METRICS_URL")]
        url: Option<String>,

        /// Require `Authorization: Bearer <token>` on scrapes
        #[arg(long, env = "LOG_METRICS_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: Option<String>,
    },
    /// Ingest a file of events and print the resulting exposition
    Replay {
        #[command(flatten)]
        config: ConfigArgs,

        /// Newline-delimited JSON events to ingest
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Validate a configuration and show every metric with its filter status
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
