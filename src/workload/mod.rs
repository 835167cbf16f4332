//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! To get the word count application:
//! ```
//! # use anyhow::Result;
//! use mrshuffle::workload;
//! # fn main() -> Result<()> {
//! let wc = workload::named("wc")?;
//! assert!(wc.combine_fn.is_some());
//! # Ok(())
//! # }
//! ```

use crate::item::{Item, ItemStore};
use crate::{default_hash_cmp, default_hash_fmt, Layout, Workload};
use anyhow::{bail, Result};
use itertools::Itertools;

pub mod grep;
pub mod wc;

/// Key hash width used by the bundled applications.
pub const HASH_SIZE: usize = 8;

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            combine_fn: Some(wc::combine),
            reduce_fn: wc::reduce,
            hash_cmp: default_hash_cmp,
            hash_fmt: default_hash_fmt,
            layout: Layout::new(HASH_SIZE, false),
        }),
        "grep" => Some(Workload {
            map_fn: grep::map,
            combine_fn: Some(grep::combine),
            reduce_fn: grep::reduce,
            hash_cmp: default_hash_cmp,
            hash_fmt: default_hash_fmt,
            layout: Layout::new(HASH_SIZE, true),
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}

/// Folds records with equal keys into one, keeping hash order.
///
/// `input` must be sorted by hash. Distinct keys sharing a hash stay
/// separate records, in order of first appearance.
fn fold_equal_keys<F>(input: ItemStore, out: &mut ItemStore, mut fold: F) -> Result<()>
where
    F: FnMut(&mut Item, Item) -> Result<()>,
{
    for (_, run) in &input.into_iter().chunk_by(|item| item.hash.clone()) {
        let mut folded: Vec<Item> = Vec::new();
        for item in run {
            match folded.iter_mut().find(|f| f.key == item.key) {
                Some(acc) => fold(acc, item)?,
                None => folded.push(item),
            }
        }
        for item in folded {
            out.push(item)?;
        }
    }
    Ok(())
}

/// Byte offset just past the last byte matching `boundary`, or the whole
/// chunk when this is the last one.
///
/// Returns 0 when a chunk that is not the last has no boundary: the record
/// does not fit in a chunk, and consuming nothing makes the map node fail
/// rather than split it.
fn cut_at(data: &[u8], last_chunk: bool, boundary: impl Fn(u8) -> bool) -> usize {
    if last_chunk {
        return data.len();
    }
    match data.iter().rposition(|&b| boundary(b)) {
        Some(pos) => pos + 1,
        None => 0,
    }
}
