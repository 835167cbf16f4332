//! A distributed MapReduce shuffle engine.
//!
//! Map nodes sort their records by key hash, agree on one set of range
//! dividers by exchanging histograms, and stream each key range to the
//! reduce node that owns it. Reduce nodes merge what they receive round by
//! round, fold duplicates with the user's combine function and finally hand
//! the result to the user's reduce function.

use bytes::Bytes;
use std::cmp::Ordering;
use std::hash::Hasher;
use std::io::Write;

pub mod codec;
pub mod config;
pub mod divider;
pub mod exchange;
pub mod histogram;
pub mod item;
pub mod merge;
pub mod node;
pub mod shuffle;
pub mod standalone;
pub mod topology;
pub mod utils;
pub mod workload;
pub mod cmd;

pub use item::{Item, ItemStore, ItemValue, Layout};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function takes a chunk of raw input, a flag telling whether this is
/// the last chunk, an output store and auxiliary arguments.
///
/// It pushes the records it produces into `out` and returns how many bytes
/// of `data` it consumed. Unconsumed bytes are handed back at the front of
/// the next chunk, so a map function should stop at a record boundary
/// unless `last_chunk` is set.
pub type MapFn =
    fn(data: &[u8], last_chunk: bool, out: &mut ItemStore, aux: &Bytes) -> anyhow::Result<usize>;

/// A combine function receives a store sorted by key hash and pushes the
/// folded records into `out`, keeping them sorted.
///
/// It runs on the map side before the shuffle and on the reduce side after
/// every merge round, so it must accept its own output as input.
pub type CombineFn = fn(input: ItemStore, out: &mut ItemStore, aux: &Bytes) -> anyhow::Result<()>;

/// A reduce function is called once per reduce node with the final,
/// combined store and writes its output to `out`.
pub type ReduceFn = fn(items: &ItemStore, out: &mut dyn Write, aux: &Bytes) -> anyhow::Result<()>;

/// Orders two key hashes. Every node of a run must use the same one.
pub type HashCmp = fn(a: &[u8], b: &[u8]) -> Ordering;

/// Renders a key hash for log output.
pub type HashFmt = fn(hash: &[u8]) -> String;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub combine_fn: Option<CombineFn>,
    pub reduce_fn: ReduceFn,
    pub hash_cmp: HashCmp,
    pub hash_fmt: HashFmt,
    /// Record layout shared by all nodes of a run.
    pub layout: Layout,
}

/////////////////////////////////////////////////////////////////////////////
// Key hashes
/////////////////////////////////////////////////////////////////////////////

/// Hashes a key into `hash_size` bytes.
///
/// The hash is built from big-endian FNV blocks, so the default byte-wise
/// comparator gives a total order over hashes.
pub fn key_hash(key: &[u8], hash_size: usize) -> Bytes {
    let mut out = Vec::with_capacity(hash_size);
    let mut block = 0u64;
    while out.len() < hash_size {
        let mut hasher = fnv::FnvHasher::with_key(0xcbf2_9ce4_8422_2325 ^ block);
        hasher.write(key);
        let value = hasher.finish().to_be_bytes();
        let take = (hash_size - out.len()).min(value.len());
        out.extend_from_slice(&value[..take]);
        block += 1;
    }
    Bytes::from(out)
}

/// The largest hash of the given size; the last divider of every run.
pub fn max_hash(hash_size: usize) -> Bytes {
    Bytes::from(vec![0xff; hash_size])
}

/// Compares hashes byte by byte.
#[inline]
pub fn default_hash_cmp(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Renders a hash as lowercase hex.
pub fn default_hash_fmt(hash: &[u8]) -> String {
    utils::hex(hash)
}
