use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim())
        .map_err(|err| format!("invalid duration '{input}' (expected e.g. 10s, 250ms, 1m): {err}"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and a human-readable summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Ramping virtual-user HTTP load generator",
    long_about = "surge drives a pool of virtual users against an HTTP target, following a staged ramp schedule.\n\nEvery virtual user repeatedly picks a weighted endpoint, records latency, errors and checks, then sleeps for a think time. Thresholds on the collected metrics decide the exit status.",
    after_help = "Examples:\n  surge run scenarios/load-test.yaml\n  surge run scenarios/load-test.yaml --base-url http://localhost:8000 --output json\n  BASE_URL=http://staging:8000 surge run scenarios/load-test.yaml --vus-cap 500\n  surge validate scenarios/load-test.yaml"
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test described by a YAML config
    #[command(
        long_about = "Run the stage schedule from a YAML config against the target.\n\nCLI flags override values from the config file."
    )]
    Run(RunArgs),

    /// Check a YAML config (stages, thresholds, endpoints) without sending traffic
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the run config (.yaml)
    pub config: PathBuf,

    /// Target base URL (overrides `baseUrl` in the config)
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Cap on concurrent virtual users (overrides `maxVUs`)
    #[arg(long, value_name = "N")]
    pub vus_cap: Option<u64>,

    /// How long to wait for in-flight iterations when stopping (e.g. 10s)
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the run config (.yaml)
    pub config: PathBuf,

    /// Target base URL (overrides `baseUrl` in the config)
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,
}
