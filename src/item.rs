//! Records and the store that holds them.
//!

use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::HashCmp;

/// Shape shared by every record of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Length of every key hash, in bytes.
    pub hash_size: usize,
    /// Values are a fixed 8-byte payload instead of a separate byte buffer.
    pub value_is_data: bool,
}

impl Layout {
    pub fn new(hash_size: usize, value_is_data: bool) -> Self {
        Self {
            hash_size,
            value_is_data,
        }
    }
}

/// The value half of a record.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ItemValue {
    /// A separately stored value.
    Data(Bytes),
    /// A payload kept in the record itself; there is no value buffer.
    Inline(u64),
}

impl ItemValue {
    /// The value bytes, or `None` for inline payloads.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            ItemValue::Data(b) => Some(b),
            ItemValue::Inline(_) => None,
        }
    }

    /// The inline payload, or `None` for separately stored values.
    pub fn inline(&self) -> Option<u64> {
        match self {
            ItemValue::Inline(v) => Some(*v),
            ItemValue::Data(_) => None,
        }
    }
}

/// A single record: key hash, key and value.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Item {
    pub hash: Bytes,
    pub key: Bytes,
    pub value: ItemValue,
}

impl Item {
    pub fn new(hash: Bytes, key: Bytes, value: ItemValue) -> Self {
        Self { hash, key, value }
    }

    /// A record with a separately stored value.
    pub fn with_data(hash: Bytes, key: Bytes, value: Bytes) -> Self {
        Self::new(hash, key, ItemValue::Data(value))
    }

    /// A record whose value lives inline.
    pub fn with_inline(hash: Bytes, key: Bytes, value: u64) -> Self {
        Self::new(hash, key, ItemValue::Inline(value))
    }

    /// Whether this record fits `layout`.
    pub fn fits(&self, layout: &Layout) -> bool {
        self.hash.len() == layout.hash_size
            && matches!(
                (&self.value, layout.value_is_data),
                (ItemValue::Inline(_), true) | (ItemValue::Data(_), false)
            )
    }
}

/// An ordered, growable sequence of records sharing one [`Layout`].
///
/// The store owns every key and value it holds; moving a record out of the
/// store moves its buffers with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemStore {
    layout: Layout,
    items: Vec<Item>,
}

impl ItemStore {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            items: Vec::new(),
        }
    }

    /// Creates a store, reserving room for `capacity` records up front.
    pub fn with_capacity(layout: Layout, capacity: usize) -> Result<Self> {
        let mut items = Vec::new();
        items
            .try_reserve(capacity)
            .with_context(|| format!("Failed to allocate an item store of {} records", capacity))?;
        Ok(Self { layout, items })
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Appends a record.
    ///
    /// Fails if the record does not match the store's layout or the store
    /// cannot grow.
    pub fn push(&mut self, item: Item) -> Result<()> {
        ensure!(
            item.fits(&self.layout),
            "Record does not fit layout {:?}: hash of {} bytes, {} value",
            self.layout,
            item.hash.len(),
            if item.value.inline().is_some() { "inline" } else { "separate" }
        );
        self.items
            .try_reserve(1)
            .context("Failed to grow item store")?;
        self.items.push(item);
        Ok(())
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    #[inline]
    pub fn first(&self) -> Option<&Item> {
        self.items.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&Item> {
        self.items.last()
    }

    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    /// Drops every record, releasing their buffers.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sorts the records by key hash. The sort is stable.
    pub fn sort_by_hash(&mut self, cmp: HashCmp) {
        self.items.sort_by(|a, b| cmp(&a.hash, &b.hash));
    }

    /// Whether every consecutive pair is in order under `cmp`.
    pub fn is_sorted_by_hash(&self, cmp: HashCmp) -> bool {
        self.items
            .windows(2)
            .all(|w| cmp(&w[0].hash, &w[1].hash) != Ordering::Greater)
    }
}

impl IntoIterator for ItemStore {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ItemStore {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
