use anyhow::{ensure, Context, Result};
use bytes::BytesMut;
use std::cmp::Ordering;
use std::io::Write;
use tracing::debug;

use crate::codec::{RangeHeader, RecordCodec};
use crate::config::NodeConfig;
use crate::divider::DividerList;
use crate::item::{Item, ItemStore};
use crate::topology::{NodeRole, Topology};
use crate::{HashCmp, HashFmt};

/// What one [`ShuffleSender::send`] call put on the wire.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SendStats {
    pub ranges: usize,
    pub items: usize,
    pub bytes: usize,
}

/// Map-side half of the shuffle.
///
/// Holds one output buffer that is reused by every destination and every
/// call.
pub struct ShuffleSender {
    codec: RecordCodec,
    buf: BytesMut,
    flush_at: usize,
}

impl ShuffleSender {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            codec: RecordCodec::new(config.layout),
            buf: BytesMut::new(),
            flush_at: config.send_buffer,
        }
    }

    /// Streams a sorted store to the reduce nodes.
    ///
    /// Reduce node `r` gets the contiguous run of records whose hash is
    /// above `dividers[r-1]` and at most `dividers[r]`. Every reduce node
    /// gets exactly one range, possibly empty, flagged terminal when
    /// `last_chunk` is set.
    pub fn send<T: Topology + ?Sized>(
        &mut self,
        topology: &mut T,
        store: &ItemStore,
        dividers: &DividerList,
        last_chunk: bool,
        cmp: HashCmp,
        fmt: HashFmt,
    ) -> Result<SendStats> {
        let reducers = topology.nodes(NodeRole::Reduce);
        ensure!(
            dividers.len() == reducers.len(),
            "Divider list has {} entries for {} reduce nodes",
            dividers.len(),
            reducers.len()
        );
        if let (Some(last), Some(bound)) = (store.last(), dividers.iter().last()) {
            ensure!(
                cmp(&last.hash, bound) != Ordering::Greater,
                "Record hash {} lies beyond the last divider {}",
                fmt(&last.hash),
                fmt(bound)
            );
        }

        let items = store.items();
        let mut stats = SendStats::default();
        let mut start = 0;
        for (divider, &id) in dividers.iter().zip(&reducers) {
            let len = items[start..]
                .partition_point(|it| cmp(&it.hash, divider) != Ordering::Greater);
            let range = &items[start..start + len];
            if let (Some(first), Some(last)) = (range.first(), range.last()) {
                debug!(
                    reducer = id,
                    divider = %fmt(divider),
                    first = %fmt(&first.hash),
                    last = %fmt(&last.hash),
                    count = len,
                    "sending range"
                );
            }
            let dst = topology.writer(NodeRole::Reduce, id)?;
            stats.bytes += self
                .write_range(dst, range, last_chunk)
                .with_context(|| format!("Failed to send range to reduce #{}", id))?;
            stats.ranges += 1;
            stats.items += len;
            start += len;
        }
        Ok(stats)
    }

    fn write_range(
        &mut self,
        dst: &mut dyn Write,
        items: &[Item],
        terminal: bool,
    ) -> Result<usize> {
        let count = u32::try_from(items.len()).context("Too many records in one range")?;
        self.buf.clear();
        RangeHeader { terminal, count }.encode(&mut self.buf);
        let mut written = 0;
        for item in items {
            self.codec.encode(item, &mut self.buf)?;
            if self.buf.len() >= self.flush_at {
                dst.write_all(&self.buf)?;
                written += self.buf.len();
                self.buf.clear();
            }
        }
        dst.write_all(&self.buf)?;
        written += self.buf.len();
        self.buf.clear();
        dst.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Layout;
    use crate::shuffle::receiver::{recv_range, Range};
    use crate::topology::local::LocalCluster;
    use crate::{default_hash_cmp, default_hash_fmt, max_hash};
    use bytes::Bytes;

    fn layout() -> Layout {
        Layout::new(1, true)
    }

    fn store(hashes: &[u8]) -> ItemStore {
        let mut s = ItemStore::new(layout());
        for &h in hashes {
            s.push(Item::with_inline(Bytes::from(vec![h]), Bytes::from(vec![h]), h as u64))
                .unwrap();
        }
        s
    }

    fn dividers(raw: &[u8]) -> DividerList {
        let mut list: Vec<Bytes> = raw.iter().map(|&b| Bytes::from(vec![b])).collect();
        list.push(max_hash(1));
        DividerList::new(list, 1, default_hash_cmp).unwrap()
    }

    fn config() -> NodeConfig {
        NodeConfig::new(layout()).unwrap()
    }

    fn take(cluster: &mut LocalCluster, reducer: usize) -> Range {
        let codec = RecordCodec::new(layout());
        let src = cluster.reduces[reducer].reader(NodeRole::Map, 0).unwrap();
        recv_range(src, &codec).unwrap()
    }

    fn hashes(s: &ItemStore) -> Vec<u8> {
        s.iter().map(|i| i.hash[0]).collect()
    }

    #[test]
    fn splits_store_at_dividers() {
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 3);
        let mut sender = ShuffleSender::new(&config());
        let stats = sender
            .send(
                &mut cluster.maps[0],
                &store(&[1, 2, 5, 5, 9, 12, 200]),
                &dividers(&[5, 10]),
                false,
                default_hash_cmp,
                default_hash_fmt,
            )
            .unwrap();
        assert_eq!(stats.ranges, 3);
        assert_eq!(stats.items, 7);

        let expected: [&[u8]; 3] = [&[1, 2, 5, 5], &[9], &[12, 200]];
        for (r, want) in expected.iter().enumerate() {
            let range = take(&mut cluster, r);
            assert!(!range.terminal);
            assert_eq!(hashes(&range.items), want.to_vec());
        }
    }

    #[test]
    fn empty_ranges_are_still_sent() {
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 3);
        let mut sender = ShuffleSender::new(&config());
        sender
            .send(
                &mut cluster.maps[0],
                &store(&[50, 60]),
                &dividers(&[10, 20]),
                true,
                default_hash_cmp,
                default_hash_fmt,
            )
            .unwrap();
        let counts: Vec<usize> = (0..3)
            .map(|r| {
                let range = take(&mut cluster, r);
                assert!(range.terminal);
                range.items.len()
            })
            .collect();
        assert_eq!(counts, vec![0, 0, 2]);
    }

    #[test]
    fn empty_store_reaches_every_reducer() {
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 4);
        let mut sender = ShuffleSender::new(&config());
        let stats = sender
            .send(
                &mut cluster.maps[0],
                &store(&[]),
                &dividers(&[1, 2, 3]),
                true,
                default_hash_cmp,
                default_hash_fmt,
            )
            .unwrap();
        assert_eq!(stats.ranges, 4);
        for r in 0..4 {
            let range = take(&mut cluster, r);
            assert!(range.terminal);
            assert!(range.items.is_empty());
        }
    }

    #[test]
    fn small_send_buffer_splits_writes() {
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 1);
        let mut config = config();
        config.send_buffer = 16;
        let mut sender = ShuffleSender::new(&config);
        let data: Vec<u8> = (0..100).collect();
        sender
            .send(
                &mut cluster.maps[0],
                &store(&data),
                &dividers(&[]),
                true,
                default_hash_cmp,
                default_hash_fmt,
            )
            .unwrap();
        let range = take(&mut cluster, 0);
        assert_eq!(hashes(&range.items), data);
    }

    #[test]
    fn divider_count_must_match_reducers() {
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 2);
        let mut sender = ShuffleSender::new(&config());
        let result = sender.send(
            &mut cluster.maps[0],
            &store(&[1]),
            &dividers(&[1, 2]),
            true,
            default_hash_cmp,
            default_hash_fmt,
        );
        assert!(result.is_err());
    }

    #[test]
    fn records_past_last_divider_are_rejected() {
        fn reversed(a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::new()], 1);
        let mut sender = ShuffleSender::new(&config());
        // under a reversed order the all-ones hash is the smallest one
        let list = DividerList::new(vec![max_hash(1)], 1, reversed).unwrap();
        let result = sender.send(
            &mut cluster.maps[0],
            &store(&[3]),
            &list,
            true,
            reversed,
            default_hash_fmt,
        );
        assert!(result.is_err());
    }
}
