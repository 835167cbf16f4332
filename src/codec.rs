//! Wire formats for records, shuffle ranges and histograms.
//!
//! All integers are little-endian. A record is laid out as
//!
//! ```text
//! key size   u32
//! key bytes
//! value      u64 inline payload          (value-is-data layout)
//!            u32 size + value bytes      (separate value layout)
//! key hash   hash_size bytes
//! ```
//!
//! A shuffle range is a terminal flag (`u32`, 0 or 1) and an item count
//! (`u32`) followed by that many records. A histogram is its entry count,
//! common step and last step (`u32` each) followed by the sampled hashes.

use anyhow::{bail, ensure, Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{Read, Write};

use crate::histogram::Histogram;
use crate::item::{Item, ItemValue, Layout};

/// Size of a shuffle range header on the wire.
pub const RANGE_HEADER_LEN: usize = 8;

/// Size of a histogram header on the wire.
pub const HISTOGRAM_HEADER_LEN: usize = 12;

/// Encodes and decodes single records of one [`Layout`].
#[derive(Copy, Clone, Debug)]
pub struct RecordCodec {
    layout: Layout,
}

impl RecordCodec {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Number of bytes `item` takes on the wire.
    pub fn encoded_len(&self, item: &Item) -> usize {
        let value = match &item.value {
            ItemValue::Inline(_) => 8,
            ItemValue::Data(v) => 4 + v.len(),
        };
        4 + item.key.len() + value + self.layout.hash_size
    }

    /// Appends `item` to `buf`.
    pub fn encode(&self, item: &Item, buf: &mut BytesMut) -> Result<()> {
        ensure!(
            item.fits(&self.layout),
            "Cannot encode a record that does not fit layout {:?}",
            self.layout
        );
        buf.reserve(self.encoded_len(item));
        buf.put_u32_le(wire_len(item.key.len())?);
        buf.put_slice(&item.key);
        match &item.value {
            ItemValue::Inline(v) => buf.put_u64_le(*v),
            ItemValue::Data(v) => {
                buf.put_u32_le(wire_len(v.len())?);
                buf.put_slice(v);
            }
        }
        buf.put_slice(&item.hash);
        Ok(())
    }

    /// Reads one record from `src`. Key and value get freshly owned buffers.
    pub fn decode<R: Read + ?Sized>(&self, src: &mut R) -> Result<Item> {
        let key_len = read_u32(src).context("Failed to read key size")? as usize;
        let key = read_bytes(src, key_len).context("Failed to read key")?;
        let value = if self.layout.value_is_data {
            ItemValue::Inline(read_u64(src).context("Failed to read inline value")?)
        } else {
            let value_len = read_u32(src).context("Failed to read value size")? as usize;
            ItemValue::Data(read_bytes(src, value_len).context("Failed to read value")?)
        };
        let hash = read_bytes(src, self.layout.hash_size).context("Failed to read key hash")?;
        Ok(Item { hash, key, value })
    }
}

/// Header of one shuffle range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RangeHeader {
    /// The sender has nothing more for this receiver after this range.
    pub terminal: bool,
    pub count: u32,
}

impl RangeHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.terminal as u32);
        buf.put_u32_le(self.count);
    }

    pub fn decode<R: Read + ?Sized>(src: &mut R) -> Result<Self> {
        let flag = read_u32(src).context("Failed to read terminal flag")?;
        let terminal = match flag {
            0 => false,
            1 => true,
            other => bail!("Malformed range header: terminal flag {}", other),
        };
        let count = read_u32(src).context("Failed to read item count")?;
        Ok(Self { terminal, count })
    }
}

/// Writes `histogram` to `dst`. Does not flush.
pub fn write_histogram(
    dst: &mut dyn Write,
    histogram: &Histogram,
    hash_size: usize,
) -> Result<()> {
    let mut buf =
        BytesMut::with_capacity(HISTOGRAM_HEADER_LEN + histogram.len() * hash_size);
    buf.put_u32_le(wire_len(histogram.len())?);
    buf.put_u32_le(wire_len(histogram.step_common)?);
    buf.put_u32_le(wire_len(histogram.step_last)?);
    for entry in histogram.entries() {
        ensure!(
            entry.len() == hash_size,
            "Histogram entry of {} bytes, expected {}",
            entry.len(),
            hash_size
        );
        buf.put_slice(entry);
    }
    dst.write_all(&buf).context("Failed to write histogram")?;
    Ok(())
}

/// Reads a histogram written by [`write_histogram`].
pub fn read_histogram(src: &mut dyn Read, hash_size: usize) -> Result<Histogram> {
    let count = read_u32(src).context("Failed to read histogram size")? as usize;
    let step_common = read_u32(src).context("Failed to read histogram step")? as usize;
    let step_last = read_u32(src).context("Failed to read histogram last step")? as usize;
    let mut entries = Vec::new();
    entries
        .try_reserve(count)
        .context("Failed to allocate histogram")?;
    for _ in 0..count {
        entries.push(read_bytes(src, hash_size).context("Failed to read histogram entry")?);
    }
    Ok(Histogram::from_parts(entries, step_common, step_last))
}

fn wire_len(len: usize) -> Result<u32> {
    u32::try_from(len).with_context(|| format!("Length {} does not fit the wire format", len))
}

fn read_u32<R: Read + ?Sized>(src: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    src.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read + ?Sized>(src: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    src.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
fn read_bytes<R: Read + ?Sized>(src: &mut R, len: usize) -> Result<Bytes> {
    let mut buf = Vec::new();
    Read::take(&mut *src, len as u64).read_to_end(&mut buf)?;
    ensure!(
        buf.len() == len,
        "Stream ended after {} of {} bytes",
        buf.len(),
        len
    );
    Ok(Bytes::from(buf))
}
