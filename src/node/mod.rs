//! Node pipelines: what a map node and a reduce node do from start to end.

pub mod map;
pub mod reduce;

use anyhow::{ensure, Result};

pub use map::{map_local, ChunkReader, MapNode, MapStats};
pub use reduce::{ReduceNode, ReduceStats};

use crate::config::NodeConfig;
use crate::topology::{NodeRole, Topology};
use crate::Workload;

fn check_setup<T: Topology + ?Sized>(
    topology: &T,
    role: NodeRole,
    workload: &Workload,
    config: &NodeConfig,
) -> Result<()> {
    config.validate()?;
    ensure!(
        workload.layout == config.layout,
        "Workload layout {:?} does not match node layout {:?}",
        workload.layout,
        config.layout
    );
    let own = topology.own();
    ensure!(own.role == role, "{} cannot run as a {} node", own, role);
    ensure!(!topology.nodes(NodeRole::Map).is_empty(), "No map nodes configured");
    ensure!(!topology.nodes(NodeRole::Reduce).is_empty(), "No reduce nodes configured");
    Ok(())
}
