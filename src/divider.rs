//! Turns the histograms of all map nodes into one key range per reducer.
//!

use anyhow::{ensure, Result};
use bytes::Bytes;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::histogram::Histogram;
use crate::{max_hash, HashCmp, HashFmt};

/// Upper bounds of the reducers' key ranges, in reducer order.
///
/// Reducer `r` owns every hash `h` with `dividers[r-1] < h <= dividers[r]`.
/// The list is non-decreasing and always ends with the maximum hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DividerList {
    dividers: Vec<Bytes>,
}

impl DividerList {
    /// Wraps a precomputed list, checking its invariants.
    pub fn new(dividers: Vec<Bytes>, hash_size: usize, cmp: HashCmp) -> Result<Self> {
        ensure!(!dividers.is_empty(), "Divider list must not be empty");
        ensure!(
            dividers.iter().all(|d| d.len() == hash_size),
            "Every divider must be {} bytes",
            hash_size
        );
        ensure!(
            dividers
                .windows(2)
                .all(|w| cmp(&w[0], &w[1]) != Ordering::Greater),
            "Divider list must be non-decreasing"
        );
        ensure!(
            dividers.last().map(|d| d[..] == max_hash(hash_size)[..]) == Some(true),
            "Divider list must end with the maximum hash"
        );
        Ok(Self { dividers })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dividers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dividers.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.dividers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> {
        self.dividers.iter()
    }

    /// Renders the list for logging.
    pub fn display(&self, fmt: HashFmt) -> String {
        let parts: Vec<String> = self.dividers.iter().map(|d| fmt(d)).collect();
        format!("[{}]", parts.join(" "))
    }
}

/// Computes the divider list for `reducers` reducers from the histograms of
/// every map node.
///
/// The histograms are walked together in hash order; a divider is placed
/// each time the items passed since the previous one reach an even share of
/// the estimated total. Identical inputs always give identical lists.
pub fn plan_dividers(
    histograms: &[Histogram],
    reducers: usize,
    hash_size: usize,
    cmp: HashCmp,
) -> Result<DividerList> {
    ensure!(reducers > 0, "At least one reducer is required");
    ensure!(hash_size > 0, "Hash size must be positive");

    let total: usize = histograms.iter().map(Histogram::estimated_items).sum();
    let block = total / reducers;
    debug!(total, reducers, block, "planning dividers");

    let mut cursors = vec![0usize; histograms.len()];
    let mut dividers = Vec::with_capacity(reducers);
    let mut current = 0usize;

    while dividers.len() + 1 < reducers {
        let Some(index) = min_head(histograms, &cursors, cmp) else {
            break;
        };
        let pos = cursors[index];
        current += histograms[index].weight(pos);
        if current >= block {
            dividers.push(histograms[index].entries()[pos].clone());
            current = 0;
        }
        cursors[index] += 1;
    }

    if dividers.len() + 1 < reducers {
        warn!(
            found = dividers.len(),
            reducers, "not enough histogram samples for every reducer"
        );
    }
    let max = max_hash(hash_size);
    dividers.resize(reducers, max);
    Ok(DividerList { dividers })
}

/// Index of the histogram whose current entry is smallest; ties go to the
/// lowest index.
fn min_head(histograms: &[Histogram], cursors: &[usize], cmp: HashCmp) -> Option<usize> {
    let mut best: Option<(usize, &Bytes)> = None;
    for (i, histogram) in histograms.iter().enumerate() {
        let Some(head) = histogram.entries().get(cursors[i]) else {
            continue;
        };
        match best {
            Some((_, min)) if cmp(head, min) != Ordering::Less => {}
            _ => best = Some((i, head)),
        }
    }
    best.map(|(i, _)| i)
}
