//! Node discovery and byte-stream channels between nodes.
//!
//! The engine never creates channels itself; it asks a [`Topology`] for the
//! nodes of a role and for a reader or writer towards one of them.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

pub mod local;
pub mod tcp;

/// Position of a node among the nodes of its role, starting at 0.
pub type NodeId = usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeRole {
    Map,
    Reduce,
    /// The source of map input (and sink of reduce output, when external).
    InputOutput,
}

impl NodeRole {
    pub fn code(self) -> u32 {
        match self {
            NodeRole::Map => 1,
            NodeRole::Reduce => 2,
            NodeRole::InputOutput => 3,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(NodeRole::Map),
            2 => Ok(NodeRole::Reduce),
            3 => Ok(NodeRole::InputOutput),
            other => bail!("Unknown node role code {}", other),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Map => write!(f, "map"),
            NodeRole::Reduce => write!(f, "reduce"),
            NodeRole::InputOutput => write!(f, "io"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "map" => Ok(NodeRole::Map),
            "reduce" => Ok(NodeRole::Reduce),
            "io" => Ok(NodeRole::InputOutput),
            _ => bail!("Unknown node role `{}`", s),
        }
    }
}

/// A node's role and id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr {
    pub role: NodeRole,
    pub id: NodeId,
}

impl NodeAddr {
    pub fn new(role: NodeRole, id: NodeId) -> Self {
        Self { role, id }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.id)
    }
}

/// The cluster as seen from one node.
///
/// Channels are opened on first use and kept for the topology's lifetime;
/// asking twice for the same peer returns the same stream.
pub trait Topology {
    /// The node this topology belongs to.
    fn own(&self) -> NodeAddr;

    /// Ids of every node of `role`, in a fixed order shared by all nodes.
    fn nodes(&self, role: NodeRole) -> Vec<NodeId>;

    /// Inbound stream from a peer. The map input is `(InputOutput, 0)`.
    fn reader(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Read>;

    /// Outbound stream to a peer.
    fn writer(&mut self, role: NodeRole, id: NodeId) -> Result<&mut dyn Write>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_codes_round_trip() {
        for role in [NodeRole::Map, NodeRole::Reduce, NodeRole::InputOutput] {
            assert_eq!(NodeRole::from_code(role.code()).unwrap(), role);
            assert_eq!(role.to_string().parse::<NodeRole>().unwrap(), role);
        }
        assert!(NodeRole::from_code(9).is_err());
        assert!("mapper".parse::<NodeRole>().is_err());
    }
}
