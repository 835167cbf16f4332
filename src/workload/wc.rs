//! A MapReduce-compatible implementation of word count.
//!
//! Counts travel as separate 8-byte big-endian values.

use super::{cut_at, fold_equal_keys, HASH_SIZE};
use crate::item::{Item, ItemStore, ItemValue};
use crate::utils::{string_from_bytes, string_to_bytes};
use crate::key_hash;
use anyhow::{ensure, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Write;

pub fn map(data: &[u8], last_chunk: bool, out: &mut ItemStore, _aux: &Bytes) -> Result<usize> {
    // words never span an ASCII non-letter
    let cursor = cut_at(data, last_chunk, |b| b.is_ascii() && !b.is_ascii_alphabetic());
    let s = String::from_utf8_lossy(&data[..cursor]);
    let words = s
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase());

    let mut value_buf = BytesMut::with_capacity(8);
    for word in words {
        let key = string_to_bytes(word);
        value_buf.put_u64(1);
        let value = value_buf.split().freeze();
        out.push(Item::with_data(key_hash(&key, HASH_SIZE), key, value))?;
    }
    Ok(cursor)
}

pub fn combine(input: ItemStore, out: &mut ItemStore, _aux: &Bytes) -> Result<()> {
    fold_equal_keys(input, out, |acc, item| {
        let total = count(&acc.value)? + count(&item.value)?;
        acc.value = ItemValue::Data(Bytes::copy_from_slice(&total.to_be_bytes()));
        Ok(())
    })
}

pub fn reduce(items: &ItemStore, out: &mut dyn Write, _aux: &Bytes) -> Result<()> {
    for item in items {
        let word = string_from_bytes(item.key.clone())?;
        writeln!(out, "{} {}", word, count(&item.value)?)?;
    }
    Ok(())
}

fn count(value: &ItemValue) -> Result<u64> {
    let mut buf = value.data().context("Word count expects separate values")?.clone();
    ensure!(buf.len() == 8, "Word count value of {} bytes", buf.len());
    Ok(buf.get_u64())
}
