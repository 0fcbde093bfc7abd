use anyhow::Result;
use clap::Parser;
use looptune_cli::cli::{run_cli, Cli};

fn main() -> Result<()> {
    run_cli(Cli::parse())
}
