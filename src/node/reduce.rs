use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::io::Write;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::item::ItemStore;
use crate::merge::merge_sorted;
use crate::shuffle::ShuffleReceiver;
use crate::topology::{NodeRole, Topology};
use crate::Workload;

/// Counters of one reduce node run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReduceStats {
    /// Receive rounds, equal to the most chunks any map node sent.
    pub rounds: usize,
    /// Records handed to the reduce function.
    pub items: usize,
}

/// A reduce node: merges the ranges arriving from every map node round by
/// round, folding them with the combine function, and reduces the result
/// once all map nodes are done.
pub struct ReduceNode {
    workload: Workload,
    config: NodeConfig,
    aux: Bytes,
}

impl ReduceNode {
    pub fn new(workload: Workload, config: NodeConfig) -> Self {
        Self {
            workload,
            config,
            aux: Bytes::new(),
        }
    }

    pub fn with_aux(mut self, aux: Bytes) -> Self {
        self.aux = aux;
        self
    }

    pub fn run<T: Topology + ?Sized>(
        &mut self,
        topology: &mut T,
        out: &mut dyn Write,
    ) -> Result<ReduceStats> {
        super::check_setup(topology, NodeRole::Reduce, &self.workload, &self.config)?;
        let combine = self
            .workload
            .combine_fn
            .ok_or_else(|| anyhow!("A reduce node needs a combine function"))?;
        let own = topology.own();
        let layout = self.config.layout;
        let cmp = self.workload.hash_cmp;
        info!(%own, "reduce node starting");

        let mut receiver = ShuffleReceiver::new(layout, topology.nodes(NodeRole::Map))?;
        let mut acc = ItemStore::new(layout);
        while !receiver.is_done() {
            let mut inputs = receiver.recv_round(topology)?;
            let fresh: usize = inputs.iter().map(ItemStore::len).sum();
            inputs.push(acc);
            let merged = merge_sorted(inputs, layout, cmp)?;
            let mut combined = ItemStore::new(layout);
            combine(merged, &mut combined, &self.aux)?;
            debug!(%own, round = receiver.rounds(), fresh, kept = combined.len(), "round merged");
            acc = combined;
        }

        (self.workload.reduce_fn)(&acc, out, &self.aux)?;
        out.flush()?;
        let stats = ReduceStats {
            rounds: receiver.rounds(),
            items: acc.len(),
        };
        info!(%own, rounds = stats.rounds, items = stats.items, "reduce node done");
        Ok(stats)
    }
}
