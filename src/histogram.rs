//! Sampled summaries of a sorted store's key distribution.
//!

use bytes::Bytes;

use crate::item::ItemStore;

/// Every `step_common`-th hash of a sorted store, plus the store's last hash.
///
/// Each entry stands for the block of items that ends at it: `step_common`
/// items for all entries but the last, `step_last` items for the last one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    entries: Vec<Bytes>,
    pub step_common: usize,
    pub step_last: usize,
}

impl Histogram {
    pub fn from_parts(entries: Vec<Bytes>, step_common: usize, step_last: usize) -> Self {
        Self {
            entries,
            step_common,
            step_last,
        }
    }

    /// Samples `store`, which must be sorted, every `stride` items.
    ///
    /// A stride of 0 yields a single entry standing for the whole store.
    /// The last item's hash is always the final entry.
    pub fn build(store: &ItemStore, stride: usize) -> Self {
        let count = store.len();
        let mut histogram = Histogram::default();
        let Some(last) = store.last() else {
            return histogram;
        };

        if stride == 0 {
            histogram.entries.push(last.hash.clone());
            histogram.step_common = count;
            histogram.step_last = count;
            return histogram;
        }

        histogram.step_common = stride;
        histogram.entries.reserve(count.div_ceil(stride));
        let mut pos = 0;
        while pos < count {
            let step = stride.min(count - pos);
            pos += step;
            histogram.step_last = step;
            histogram.entries.push(store.items()[pos - 1].hash.clone());
        }
        histogram
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[Bytes] {
        &self.entries
    }

    /// Number of items the entry at `index` stands for.
    pub fn weight(&self, index: usize) -> usize {
        if index + 1 < self.entries.len() {
            self.step_common
        } else {
            self.step_last
        }
    }

    /// Estimated number of items in the sampled store.
    pub fn estimated_items(&self) -> usize {
        match self.entries.len() {
            0 => 0,
            n => self.step_common * (n - 1) + self.step_last,
        }
    }
}
