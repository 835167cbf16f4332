use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use tracing::info;

use crate::config::NodeConfig;
use crate::node::{MapNode, ReduceNode};
use crate::topology::tcp::{ClusterSpec, TcpTopology};
use crate::topology::{NodeAddr, NodeRole};
use crate::utils::serialize_args;
use crate::workload;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// JSON file listing the map and reduce node addresses
    #[clap(short, long)]
    pub cluster: String,
    /// Role of this node: `map` or `reduce`
    #[clap(short, long)]
    pub role: NodeRole,
    /// Index of this node among the nodes of its role
    #[clap(long)]
    pub id: usize,
    /// Name of the workload
    #[clap(short, long)]
    pub workload: String,
    /// [MAP] Input file, standard input when omitted
    #[clap(short, long)]
    pub input: Option<String>,
    /// [REDUCE] Output file, standard output when omitted
    #[clap(short, long)]
    pub output: Option<String>,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}

/// Runs one node of a TCP cluster to completion.
pub fn run(args: Args) -> Result<()> {
    let engine = workload::named(&args.workload)?;
    let config = NodeConfig::from_env(engine.layout)?;
    let aux = serialize_args(&args.args)?;
    let cluster = ClusterSpec::load(&args.cluster)?;
    let own = NodeAddr::new(args.role, args.id);
    info!(%own, workload = %args.workload, "worker starting");

    match args.role {
        NodeRole::Map => {
            let input: Box<dyn Read + Send> = match &args.input {
                Some(path) => Box::new(BufReader::new(
                    File::open(path).with_context(|| format!("Cannot open input {}", path))?,
                )),
                None => Box::new(io::stdin()),
            };
            let mut topology = TcpTopology::bind(cluster, own, Some(input))?;
            let stats = MapNode::new(engine, config).with_aux(aux).run(&mut topology)?;
            info!(
                %own,
                chunks = stats.chunks,
                items = stats.items_sent,
                bytes = stats.bytes_sent,
                "map finished"
            );
        }
        NodeRole::Reduce => {
            let mut out: Box<dyn Write> = match &args.output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("Cannot create output {}", path))?,
                )),
                None => Box::new(io::stdout().lock()),
            };
            let mut topology = TcpTopology::bind(cluster, own, None)?;
            let stats = ReduceNode::new(engine, config)
                .with_aux(aux)
                .run(&mut topology, &mut out)?;
            info!(%own, rounds = stats.rounds, items = stats.items, "reduce finished");
        }
        NodeRole::InputOutput => anyhow::bail!("A worker runs either a map or a reduce node"),
    }
    Ok(())
}
