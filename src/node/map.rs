use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use std::io::{ErrorKind, Read};
use tracing::{debug, info, warn};

use crate::codec::{read_histogram, write_histogram};
use crate::config::NodeConfig;
use crate::divider::{plan_dividers, DividerList};
use crate::exchange::exchange_all_to_all;
use crate::histogram::Histogram;
use crate::item::ItemStore;
use crate::shuffle::ShuffleSender;
use crate::topology::{NodeRole, Topology};
use crate::Workload;

/// Fixed-size input buffer handing chunks to the map function.
///
/// Bytes the map function leaves unconsumed are moved to the front and the
/// rest of the buffer is refilled behind them.
pub struct ChunkReader {
    buf: Vec<u8>,
    len: usize,
    calls: usize,
}

impl ChunkReader {
    pub fn new(chunk_size: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "Chunk size must be positive");
        let mut buf = Vec::new();
        buf.try_reserve_exact(chunk_size)
            .with_context(|| format!("Cannot allocate a {} byte chunk buffer", chunk_size))?;
        buf.resize(chunk_size, 0);
        Ok(Self {
            buf,
            len: 0,
            calls: 0,
        })
    }

    /// Tops the buffer up from `src`. Returns true when `src` ran dry
    /// before the buffer was full, i.e. this is the last chunk.
    pub fn fill(&mut self, src: &mut dyn Read) -> Result<bool> {
        while self.len < self.buf.len() {
            match src.read(&mut self.buf[self.len..]) {
                Ok(0) => return Ok(true),
                Ok(n) => self.len += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read map input"),
            }
        }
        Ok(false)
    }

    /// Bytes currently buffered.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Drops the first `cursor` bytes, keeping the rest for the next chunk.
    ///
    /// A map function must make progress: consuming nothing of a non-empty
    /// buffer is only allowed on the first chunk.
    pub fn consume(&mut self, cursor: usize) -> Result<()> {
        self.calls += 1;
        ensure!(
            cursor <= self.len,
            "Map function consumed {} bytes of a {} byte chunk",
            cursor,
            self.len
        );
        ensure!(
            cursor > 0 || self.len == 0 || self.calls == 1,
            "Map function consumed nothing of a {} byte chunk",
            self.len
        );
        self.buf.copy_within(cursor..self.len, 0);
        self.len -= cursor;
        Ok(())
    }
}

/// Runs the map function over one chunk, then sorts by hash and combines.
///
/// Returns the resulting store and the number of input bytes consumed. An
/// empty chunk gives an empty store without calling the map function.
pub fn map_local(
    workload: &Workload,
    data: &[u8],
    last_chunk: bool,
    aux: &Bytes,
) -> Result<(ItemStore, usize)> {
    let mut store = ItemStore::new(workload.layout);
    if data.is_empty() {
        return Ok((store, 0));
    }
    let cursor = (workload.map_fn)(data, last_chunk, &mut store, aux)?;
    store.sort_by_hash(workload.hash_cmp);
    let store = match workload.combine_fn {
        Some(combine) => {
            let mut combined = ItemStore::new(workload.layout);
            combine(store, &mut combined, aux)?;
            combined
        }
        None => store,
    };
    Ok((store, cursor))
}

/// Counters of one map node run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MapStats {
    pub chunks: usize,
    pub items_sent: usize,
    pub bytes_sent: usize,
}

/// A map node: reads its input chunk by chunk and shuffles every chunk's
/// records to the reduce nodes.
pub struct MapNode {
    workload: Workload,
    config: NodeConfig,
    aux: Bytes,
    dividers: Option<DividerList>,
}

impl MapNode {
    pub fn new(workload: Workload, config: NodeConfig) -> Self {
        Self {
            workload,
            config,
            aux: Bytes::new(),
            dividers: None,
        }
    }

    /// Arguments handed to the workload's functions.
    pub fn with_aux(mut self, aux: Bytes) -> Self {
        self.aux = aux;
        self
    }

    /// Uses a fixed divider list instead of planning one from histograms.
    ///
    /// Every map node of the run must be given the same list, since none of
    /// them takes part in the histogram exchange.
    pub fn with_dividers(mut self, dividers: DividerList) -> Self {
        self.dividers = Some(dividers);
        self
    }

    pub fn run<T: Topology + ?Sized>(&mut self, topology: &mut T) -> Result<MapStats> {
        super::check_setup(topology, NodeRole::Map, &self.workload, &self.config)?;
        let own = topology.own();
        let cmp = self.workload.hash_cmp;
        let fmt = self.workload.hash_fmt;
        info!(%own, chunk_size = self.config.chunk_size, "map node starting");

        let mut reader = ChunkReader::new(self.config.chunk_size)?;
        let mut sender = ShuffleSender::new(&self.config);
        let mut dividers = self.dividers.clone();
        let mut stats = MapStats::default();

        loop {
            let input = topology.reader(NodeRole::InputOutput, 0)?;
            let last_chunk = reader.fill(input)?;
            let size = reader.data().len();
            let (store, cursor) = map_local(&self.workload, reader.data(), last_chunk, &self.aux)
                .with_context(|| format!("Map failed on chunk {}", stats.chunks))?;
            reader.consume(cursor)?;
            if last_chunk && cursor < size {
                warn!(%own, left = size - cursor, "last chunk not fully consumed by map");
            }

            if dividers.is_none() {
                dividers = Some(self.plan(topology, &store)?);
            }
            let list = dividers.as_ref().context("No divider list")?;

            let sent = sender.send(topology, &store, list, last_chunk, cmp, fmt)?;
            debug!(
                %own,
                chunk = stats.chunks,
                bytes = size,
                consumed = cursor,
                items = sent.items,
                last_chunk,
                "chunk shuffled"
            );
            stats.chunks += 1;
            stats.items_sent += sent.items;
            stats.bytes_sent += sent.bytes;
            if last_chunk {
                break;
            }
        }

        info!(%own, chunks = stats.chunks, items = stats.items_sent, "map node done");
        Ok(stats)
    }

    /// Samples the first chunk's store, trades histograms with the other map
    /// nodes and derives the divider list from all of them.
    fn plan<T: Topology + ?Sized>(
        &self,
        topology: &mut T,
        store: &ItemStore,
    ) -> Result<DividerList> {
        let own = topology.own();
        let maps = topology.nodes(NodeRole::Map);
        let reducers = topology.nodes(NodeRole::Reduce).len();
        let hash_size = self.config.layout.hash_size;
        let index = maps
            .iter()
            .position(|&id| id == own.id)
            .with_context(|| format!("{} is not part of the map node list", own))?;

        let stride = store.len() / self.config.histogram_density / maps.len();
        let histogram = Histogram::build(store, stride);
        debug!(%own, entries = histogram.len(), stride, "histogram built");

        let mut histograms = vec![Histogram::default(); maps.len()];
        exchange_all_to_all(
            topology,
            NodeRole::Map,
            |_, dst| write_histogram(dst, &histogram, hash_size),
            |peer, src| {
                histograms[peer] = read_histogram(src, hash_size)?;
                Ok(())
            },
        )?;
        histograms[index] = histogram;

        let dividers = plan_dividers(&histograms, reducers, hash_size, self.workload.hash_cmp)?;
        info!(%own, dividers = %dividers.display(self.workload.hash_fmt), "dividers planned");
        Ok(dividers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, Layout};
    use crate::{default_hash_cmp, default_hash_fmt, key_hash};
    use std::io::Cursor;

    /// Reads `n` bytes at a time so reads come back short.
    struct Trickle<'a>(&'a [u8], usize);

    impl Read for Trickle<'_> {
        fn read(&mut self, dst: &mut [u8]) -> std::io::Result<usize> {
            let n = self.1.min(dst.len()).min(self.0.len());
            dst[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    fn lines(data: &[u8], last: bool, out: &mut ItemStore, _: &Bytes) -> Result<usize> {
        let mut cursor = 0;
        for line in data.split_inclusive(|&b| b == b'\n') {
            if !last && !line.ends_with(b"\n") {
                break;
            }
            cursor += line.len();
            let key = Bytes::copy_from_slice(line.strip_suffix(b"\n").unwrap_or(line));
            out.push(Item::with_inline(key_hash(&key, 8), key, 1))?;
        }
        Ok(cursor)
    }

    fn reduce_nothing(_: &ItemStore, _: &mut dyn std::io::Write, _: &Bytes) -> Result<()> {
        Ok(())
    }

    fn workload() -> Workload {
        Workload {
            map_fn: lines,
            combine_fn: None,
            reduce_fn: reduce_nothing,
            hash_cmp: default_hash_cmp,
            hash_fmt: default_hash_fmt,
            layout: Layout::new(8, true),
        }
    }

    #[test]
    fn fill_spans_short_reads() {
        let mut reader = ChunkReader::new(8).unwrap();
        let mut src = Trickle(b"abcdefghij", 3);
        assert!(!reader.fill(&mut src).unwrap());
        assert_eq!(reader.data(), b"abcdefgh");
        reader.consume(8).unwrap();
        assert!(reader.fill(&mut src).unwrap());
        assert_eq!(reader.data(), b"ij");
    }

    #[test]
    fn leftover_moves_to_front() {
        let mut reader = ChunkReader::new(6).unwrap();
        let mut src = Cursor::new(b"abcdefghi".to_vec());
        reader.fill(&mut src).unwrap();
        // less than half consumed: the kept bytes overlap their new place
        reader.consume(2).unwrap();
        assert_eq!(reader.data(), b"cdef");
        assert!(!reader.fill(&mut src).unwrap());
        assert_eq!(reader.data(), b"cdefgh");
        reader.consume(6).unwrap();
        assert!(reader.fill(&mut src).unwrap());
        assert_eq!(reader.data(), b"i");
    }

    #[test]
    fn consume_checks_cursor() {
        let mut reader = ChunkReader::new(4).unwrap();
        reader.fill(&mut Cursor::new(b"abcdef".to_vec())).unwrap();
        assert!(reader.consume(5).is_err());

        let mut reader = ChunkReader::new(4).unwrap();
        reader.fill(&mut Cursor::new(b"abcdef".to_vec())).unwrap();
        reader.consume(0).unwrap();
        assert!(reader.consume(0).is_err());
    }

    #[test]
    fn consume_nothing_of_empty_buffer_is_fine() {
        let mut reader = ChunkReader::new(4).unwrap();
        reader.fill(&mut Cursor::new(Vec::new())).unwrap();
        reader.consume(0).unwrap();
        reader.consume(0).unwrap();
    }

    #[test]
    fn map_local_sorts_output() {
        let data = b"pear\napple\nfig\nki";
        let (store, cursor) = map_local(&workload(), data, false, &Bytes::new()).unwrap();
        assert_eq!(cursor, 15);
        assert_eq!(store.len(), 3);
        assert!(store.is_sorted_by_hash(default_hash_cmp));
    }

    #[test]
    fn map_local_skips_empty_chunk() {
        fn refuse(_: &[u8], _: bool, _: &mut ItemStore, _: &Bytes) -> Result<usize> {
            anyhow::bail!("map called on empty chunk")
        }
        let mut w = workload();
        w.map_fn = refuse;
        let (store, cursor) = map_local(&w, b"", true, &Bytes::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(cursor, 0);
    }

    #[test]
    fn map_local_applies_combine() {
        fn keep_first(input: ItemStore, out: &mut ItemStore, _: &Bytes) -> Result<()> {
            if let Some(first) = input.into_iter().next() {
                out.push(first)?;
            }
            Ok(())
        }
        let mut w = workload();
        w.combine_fn = Some(keep_first);
        let (store, _) = map_local(&w, b"a\nb\nc\n", true, &Bytes::new()).unwrap();
        assert_eq!(store.len(), 1);
    }
}
