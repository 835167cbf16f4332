//! An in-process cluster: every channel is a pipe between threads.
//!
//! Pipes are unbounded message queues, so writers never block. Used by the
//! standalone runner and by tests.

use anyhow::{anyhow, Result};
use bytes::{Buf, Bytes};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::mpsc::{channel, Receiver, Sender};

use super::{NodeAddr, NodeId, NodeRole, Topology};

/// Writing half of a pipe.
pub struct PipeWriter {
    tx: Sender<Bytes>,
}

/// Reading half of a pipe. Reports end of stream once every writer is gone
/// and all data has been read.
pub struct PipeReader {
    rx: Receiver<Bytes>,
    pending: Bytes,
}

/// Creates a connected pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            pending: Bytes::new(),
        },
    )
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader is gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = dst.len().min(self.pending.len());
        dst[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// One node's view of a [`LocalCluster`].
pub struct LocalTopology {
    own: NodeAddr,
    maps: usize,
    reduces: usize,
    readers: HashMap<NodeAddr, Box<dyn Read + Send>>,
    writers: HashMap<NodeAddr, Box<dyn Write + Send>>,
}

impl LocalTopology {
    fn new(own: NodeAddr, maps: usize, reduces: usize) -> Self {
        Self {
            own,
            maps,
            reduces,
            readers: HashMap::new(),
            writers: HashMap::new(),
        }
    }
}

impl Topology for LocalTopology {
    fn own(&self) -> NodeAddr {
        self.own
    }

    fn nodes(&self, role: NodeRole) -> Vec<NodeId> {
        match role {
            NodeRole::Map => (0..self.maps).collect(),
            NodeRole::Reduce => (0..self.reduces).collect(),
            NodeRole::InputOutput => vec![0],
        }
    }

    fn reader(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Read> {
        let own = self.own;
        let peer = NodeAddr::new(role, id);
        match self.readers.get_mut(&peer) {
            Some(reader) => Ok(reader.as_mut()),
            None => Err(anyhow!("{} has no channel from {}", own, peer)),
        }
    }

    fn writer(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Write> {
        let own = self.own;
        let peer = NodeAddr::new(role, id);
        match self.writers.get_mut(&peer) {
            Some(writer) => Ok(writer.as_mut()),
            None => Err(anyhow!("{} has no channel to {}", own, peer)),
        }
    }
}

/// Topologies for every node of an in-process cluster.
///
/// Map node `i` reads its input from `inputs[i]`; map nodes are wired to
/// each other and to every reduce node.
pub struct LocalCluster {
    pub maps: Vec<LocalTopology>,
    pub reduces: Vec<LocalTopology>,
}

impl LocalCluster {
    pub fn new(inputs: Vec<Box<dyn Read + Send>>, reducers: usize) -> Self {
        let n_map = inputs.len();
        let mut maps: Vec<LocalTopology> = (0..n_map)
            .map(|i| LocalTopology::new(NodeAddr::new(NodeRole::Map, i), n_map, reducers))
            .collect();
        let mut reduces: Vec<LocalTopology> = (0..reducers)
            .map(|r| LocalTopology::new(NodeAddr::new(NodeRole::Reduce, r), n_map, reducers))
            .collect();

        for (i, input) in inputs.into_iter().enumerate() {
            maps[i]
                .readers
                .insert(NodeAddr::new(NodeRole::InputOutput, 0), input);
        }

        for from in 0..n_map {
            for to in 0..n_map {
                if from == to {
                    continue;
                }
                let (tx, rx) = pipe();
                maps[from]
                    .writers
                    .insert(NodeAddr::new(NodeRole::Map, to), Box::new(tx));
                maps[to]
                    .readers
                    .insert(NodeAddr::new(NodeRole::Map, from), Box::new(rx));
            }
            for (to, reduce) in reduces.iter_mut().enumerate() {
                let (tx, rx) = pipe();
                maps[from]
                    .writers
                    .insert(NodeAddr::new(NodeRole::Reduce, to), Box::new(tx));
                reduce
                    .readers
                    .insert(NodeAddr::new(NodeRole::Map, from), Box::new(rx));
            }
        }

        Self { maps, reduces }
    }

    /// A cluster whose map inputs are in memory.
    pub fn from_bytes(inputs: Vec<Bytes>, reducers: usize) -> Self {
        let inputs = inputs
            .into_iter()
            .map(|b| Box::new(Cursor::new(b)) as Box<dyn Read + Send>)
            .collect();
        Self::new(inputs, reducers)
    }
}
