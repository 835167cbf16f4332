//! Each-to-other communication among the nodes of one role.
//!

use anyhow::{Context, Result};
use std::io::{Read, Write};
use tracing::debug;

use crate::topology::{NodeRole, Topology};

/// Sends this node's payload to every other node of `role` and receives
/// theirs.
///
/// `write` is called once per peer with the peer's index in the role's
/// node list and its outbound stream, which is flushed afterwards. `read`
/// is then called once per peer with the peer's index and inbound stream.
/// All writes happen before the first read.
pub fn exchange_all_to_all<T, W, R>(
    topology: &mut T,
    role: NodeRole,
    mut write: W,
    mut read: R,
) -> Result<()>
where
    T: Topology + ?Sized,
    W: FnMut(usize, &mut dyn Write) -> Result<()>,
    R: FnMut(usize, &mut dyn Read) -> Result<()>,
{
    let own = topology.own();
    let peers: Vec<(usize, usize)> = topology
        .nodes(role)
        .into_iter()
        .enumerate()
        .filter(|&(_, id)| !(own.role == role && own.id == id))
        .collect();

    for &(index, id) in &peers {
        debug!(%own, %role, peer = id, "exchange: write");
        let dst = topology.writer(role, id)?;
        write(index, &mut *dst).with_context(|| format!("Failed to send to {} #{}", role, id))?;
        dst.flush()
            .with_context(|| format!("Failed to flush channel to {} #{}", role, id))?;
    }

    for &(index, id) in &peers {
        debug!(%own, %role, peer = id, "exchange: read");
        let src = topology.reader(role, id)?;
        read(index, &mut *src).with_context(|| format!("Failed to receive from {} #{}", role, id))?;
    }

    Ok(())
}
