use anyhow::Result;
use clap::Parser;
use mrshuffle::standalone::{engine::run_job, Args, Job};
use mrshuffle::utils::init_tracing;
use mrshuffle::workload;

fn parse_args() -> Job {
    let args = Args::parse();
    Job::from(args.command)
}

fn main() -> Result<()> {
    init_tracing();
    let job = parse_args();
    let engine = workload::named(&job.workload)?;
    run_job(&job, engine)?;
    Ok(())
}
