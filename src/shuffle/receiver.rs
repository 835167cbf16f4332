use anyhow::{ensure, Context, Result};
use std::io::Read;
use tracing::{debug, trace};

use crate::codec::{RangeHeader, RecordCodec};
use crate::item::{ItemStore, Layout};
use crate::topology::{NodeId, NodeRole, Topology};

/// One range message as received by a reduce node.
#[derive(Debug)]
pub struct Range {
    /// Set on the last range a map node sends to this reduce node.
    pub terminal: bool,
    pub items: ItemStore,
}

/// Reads one range message: header, then `count` records.
pub fn recv_range(src: &mut dyn Read, codec: &RecordCodec) -> Result<Range> {
    let header = RangeHeader::decode(src).context("Failed to read range header")?;
    let mut items = ItemStore::with_capacity(codec.layout(), header.count as usize)?;
    for index in 0..header.count {
        let item = codec
            .decode(src)
            .with_context(|| format!("Failed to read record {} of {}", index, header.count))?;
        items.push(item)?;
    }
    Ok(Range {
        terminal: header.terminal,
        items,
    })
}

/// Reduce-side half of the shuffle.
///
/// Tracks which map nodes have sent their terminal range. A round reads one
/// range from every map node that has not finished yet, in map id order.
pub struct ShuffleReceiver {
    codec: RecordCodec,
    mappers: Vec<NodeId>,
    finished: Vec<bool>,
    rounds: usize,
}

impl ShuffleReceiver {
    pub fn new(layout: Layout, mappers: Vec<NodeId>) -> Result<Self> {
        ensure!(!mappers.is_empty(), "A reduce node needs at least one map node");
        let finished = vec![false; mappers.len()];
        Ok(Self {
            codec: RecordCodec::new(layout),
            mappers,
            finished,
            rounds: 0,
        })
    }

    /// Whether every map node has sent its terminal range.
    pub fn is_done(&self) -> bool {
        self.finished.iter().all(|&f| f)
    }

    /// Rounds received so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Receives one range from every active map node.
    ///
    /// The returned stores are in map id order and each is sorted the way
    /// its sender sorted it.
    pub fn recv_round<T: Topology + ?Sized>(&mut self, topology: &mut T) -> Result<Vec<ItemStore>> {
        ensure!(!self.is_done(), "Every map node has already finished");
        let mut fresh = Vec::with_capacity(self.mappers.len());
        for (slot, &id) in self.mappers.iter().enumerate() {
            if self.finished[slot] {
                continue;
            }
            let src = topology.reader(NodeRole::Map, id)?;
            let range = recv_range(src, &self.codec)
                .with_context(|| format!("Failed to receive range from map #{}", id))?;
            trace!(
                mapper = id,
                count = range.items.len(),
                terminal = range.terminal,
                "range received"
            );
            if range.terminal {
                debug!(mapper = id, round = self.rounds, "map node finished");
                self.finished[slot] = true;
            }
            fresh.push(range.items);
        }
        self.rounds += 1;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use bytes::{Bytes, BytesMut};
    use std::io::Cursor;

    fn layout() -> Layout {
        Layout::new(2, false)
    }

    fn message(terminal: bool, keys: &[&str]) -> BytesMut {
        let codec = RecordCodec::new(layout());
        let mut buf = BytesMut::new();
        RangeHeader {
            terminal,
            count: keys.len() as u32,
        }
        .encode(&mut buf);
        for (i, key) in keys.iter().enumerate() {
            let item = Item::with_data(
                Bytes::from(vec![0, i as u8]),
                Bytes::from(key.to_string()),
                Bytes::from_static(b"v"),
            );
            codec.encode(&item, &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn reads_header_and_records() {
        let mut wire = message(true, &["one", "two"]);
        wire.extend_from_slice(&message(false, &[]));
        let mut src = Cursor::new(wire.freeze());
        let codec = RecordCodec::new(layout());

        let first = recv_range(&mut src, &codec).unwrap();
        assert!(first.terminal);
        assert_eq!(first.items.len(), 2);
        assert_eq!(&first.items.get(1).unwrap().key[..], b"two");

        let second = recv_range(&mut src, &codec).unwrap();
        assert!(!second.terminal);
        assert!(second.items.is_empty());
    }

    #[test]
    fn short_message_is_an_error() {
        let wire = message(false, &["one", "two"]);
        let cut = wire.len() - 3;
        let mut src = Cursor::new(wire.freeze().slice(..cut));
        assert!(recv_range(&mut src, &RecordCodec::new(layout())).is_err());
    }

    #[test]
    fn receiver_needs_mappers() {
        assert!(ShuffleReceiver::new(layout(), vec![]).is_err());
    }
}
