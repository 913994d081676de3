use anyhow::Result;
use brand_evolution_cli::{run_cli, Cli};
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();
    run_cli(Cli::parse())
}
