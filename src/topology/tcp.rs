//! A cluster of processes talking over TCP.
//!
//! Every map and reduce node listens on the address the cluster file gives
//! it. A node opening a channel connects to the peer's address and
//! introduces itself with an 8-byte handshake (role code and id, both
//! little-endian `u32`); the peer accepts connections on demand and files
//! them by handshake.

use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info};

use super::{NodeAddr, NodeId, NodeRole, Topology};

const CONNECT_ATTEMPTS: u32 = 100;
const CONNECT_RETRY: Duration = Duration::from_millis(200);

/// Listen addresses of every node, in node id order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub map: Vec<String>,
    pub reduce: Vec<String>,
}

impl ClusterSpec {
    /// Reads a cluster description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let spec: ClusterSpec = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse cluster file {}", path.display()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.map.is_empty(), "Cluster has no map nodes");
        ensure!(!self.reduce.is_empty(), "Cluster has no reduce nodes");
        Ok(())
    }

    pub fn address(&self, node: NodeAddr) -> Result<&str> {
        let list = match node.role {
            NodeRole::Map => &self.map,
            NodeRole::Reduce => &self.reduce,
            NodeRole::InputOutput => bail!("Input/output node has no network address"),
        };
        list.get(node.id)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("No address for {}", node))
    }
}

pub struct TcpTopology {
    own: NodeAddr,
    cluster: ClusterSpec,
    listener: TcpListener,
    input: Option<Box<dyn Read + Send>>,
    inbound: HashMap<NodeAddr, BufReader<TcpStream>>,
    outbound: HashMap<NodeAddr, BufWriter<TcpStream>>,
}

impl TcpTopology {
    /// Binds this node's listen address.
    ///
    /// `input` is the map input stream; reduce nodes pass `None`.
    pub fn bind(
        cluster: ClusterSpec,
        own: NodeAddr,
        input: Option<Box<dyn Read + Send>>,
    ) -> Result<Self> {
        cluster.validate()?;
        let addr = cluster.address(own)?.to_string();
        let listener =
            TcpListener::bind(&addr).with_context(|| format!("Failed to listen on {}", addr))?;
        info!(node = %own, %addr, "listening");
        Ok(Self {
            own,
            cluster,
            listener,
            input,
            inbound: HashMap::new(),
            outbound: HashMap::new(),
        })
    }

    fn connect(&self, peer: NodeAddr) -> Result<TcpStream> {
        let addr = self.cluster.address(peer)?;
        let mut attempt = 0;
        let mut stream = loop {
            match TcpStream::connect(addr) {
                Ok(stream) => break stream,
                Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                    debug!(%peer, %addr, error = %e, "peer not up yet");
                    attempt += 1;
                    sleep(CONNECT_RETRY);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to connect to {} at {}", peer, addr))
                }
            }
        };
        stream.set_nodelay(true)?;
        let mut handshake = [0u8; 8];
        handshake[..4].copy_from_slice(&self.own.role.code().to_le_bytes());
        handshake[4..].copy_from_slice(&(self.own.id as u32).to_le_bytes());
        stream
            .write_all(&handshake)
            .with_context(|| format!("Failed to introduce {} to {}", self.own, peer))?;
        debug!(own = %self.own, %peer, "connected");
        Ok(stream)
    }

    /// Accepts connections until one from `peer` shows up.
    fn accept_from(&mut self, peer: NodeAddr) -> Result<()> {
        while !self.inbound.contains_key(&peer) {
            let (mut stream, remote) = self.listener.accept().context("Failed to accept")?;
            let mut handshake = [0u8; 8];
            stream
                .read_exact(&mut handshake)
                .with_context(|| format!("Failed to read handshake from {}", remote))?;
            let role = NodeRole::from_code(u32::from_le_bytes([
                handshake[0],
                handshake[1],
                handshake[2],
                handshake[3],
            ]))?;
            let id = u32::from_le_bytes([handshake[4], handshake[5], handshake[6], handshake[7]])
                as NodeId;
            let from = NodeAddr::new(role, id);
            ensure!(
                !self.inbound.contains_key(&from),
                "{} connected to {} twice",
                from,
                self.own
            );
            debug!(own = %self.own, %from, %remote, "accepted");
            self.inbound.insert(from, BufReader::new(stream));
        }
        Ok(())
    }
}

impl Topology for TcpTopology {
    fn own(&self) -> NodeAddr {
        self.own
    }

    fn nodes(&self, role: NodeRole) -> Vec<NodeId> {
        match role {
            NodeRole::Map => (0..self.cluster.map.len()).collect(),
            NodeRole::Reduce => (0..self.cluster.reduce.len()).collect(),
            NodeRole::InputOutput => vec![0],
        }
    }

    fn reader(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Read> {
        if role == NodeRole::InputOutput {
            let own = self.own;
            return match self.input.as_mut() {
                Some(input) => Ok(input.as_mut()),
                None => Err(anyhow!("{} has no input channel", own)),
            };
        }
        let peer = NodeAddr::new(role, id);
        self.accept_from(peer)?;
        self.inbound
            .get_mut(&peer)
            .map(|r| r as &mut dyn Read)
            .ok_or_else(|| anyhow!("No channel from {}", peer))
    }

    fn writer(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Write> {
        let peer = NodeAddr::new(role, id);
        if !self.outbound.contains_key(&peer) {
            let stream = self.connect(peer)?;
            self.outbound.insert(peer, BufWriter::new(stream));
        }
        self.outbound
            .get_mut(&peer)
            .map(|w| w as &mut dyn Write)
            .ok_or_else(|| anyhow!("No channel to {}", peer))
    }
}
