//! HomeViz CLI: tenant-configurable home-improvement visualizer.
//!
//! Turns a "before" photo into a photorealistic "after" image through a
//! tenant's pipeline, and manages versioned prompt overrides.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
