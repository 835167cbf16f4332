//! K-way merge of sorted stores.
//!

use anyhow::{ensure, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::item::{Item, ItemStore, Layout};
use crate::HashCmp;

/// Current head of one merge input.
struct Head {
    item: Item,
    source: usize,
    cmp: HashCmp,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    // Reversed so the max-heap pops the smallest hash, then the lowest source.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&other.item.hash, &self.item.hash).then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges stores that are each sorted by `cmp` into one sorted store.
///
/// Among equal hashes, records from lower input indexes come first, and
/// records of one input keep their relative order. The inputs are consumed.
pub fn merge_sorted(inputs: Vec<ItemStore>, layout: Layout, cmp: HashCmp) -> Result<ItemStore> {
    ensure!(
        inputs.iter().all(|s| s.layout() == layout),
        "Cannot merge stores of different layouts"
    );
    let total = inputs.iter().map(ItemStore::len).sum();
    let mut out = ItemStore::with_capacity(layout, total)?;

    let mut sources: Vec<_> = inputs.into_iter().map(IntoIterator::into_iter).collect();
    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (source, iter) in sources.iter_mut().enumerate() {
        if let Some(item) = iter.next() {
            heap.push(Head { item, source, cmp });
        }
    }

    while let Some(Head { item, source, .. }) = heap.pop() {
        out.push(item)?;
        if let Some(next) = sources[source].next() {
            heap.push(Head {
                item: next,
                source,
                cmp,
            });
        }
    }
    Ok(out)
}
