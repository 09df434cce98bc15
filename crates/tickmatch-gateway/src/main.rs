//! The tickmatch gateway binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tickmatch_gateway::config::Config;
use tickmatch_gateway::supervisor;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let default_filter = if config.quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    supervisor::run(config)
}
