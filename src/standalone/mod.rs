use clap::{Parser, Subcommand};

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job on an in-process cluster
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        // Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of map nodes (default: one per input file)
        #[arg(short, long)]
        mappers: Option<usize>,

        /// Number of reduce nodes
        #[arg(short, long, default_value_t = 4)]
        reducers: usize,

        /// Auxiliary arguments to pass to the MapReduce application.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: String,
    pub mappers: Option<usize>,
    pub reducers: usize,
    pub args: Vec<String>,
}

impl From<Commands> for Job {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Submit {
                input,
                workload,
                output,
                mappers,
                reducers,
                args,
            } => Job {
                input,
                workload,
                output,
                mappers,
                reducers,
                args,
            },
        }
    }
}
