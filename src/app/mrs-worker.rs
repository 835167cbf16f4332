use anyhow::Result;
use clap::Parser;
use mrshuffle::cmd::worker::{run, Args};
use mrshuffle::utils::init_tracing;

fn main() -> Result<()> {
    init_tracing();
    run(Args::parse())
}
