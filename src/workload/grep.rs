//! A MapReduce-compatible implementation of `grep`: counts the lines that
//! contain a term.
//!

use super::{cut_at, fold_equal_keys, HASH_SIZE};
use crate::item::{Item, ItemStore, ItemValue};
use crate::key_hash;
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    let raw = serde_json::from_slice::<Vec<String>>(aux)
        .context("grep arguments are not a JSON list")?;
    Ok(Args::try_parse_from(raw)?)
}

pub fn map(data: &[u8], last_chunk: bool, out: &mut ItemStore, aux: &Bytes) -> Result<usize> {
    let term = parse_args(aux)?.term;
    let cursor = cut_at(data, last_chunk, |b| b == b'\n');

    let s = String::from_utf8_lossy(&data[..cursor]);
    for line in s.lines().filter(|s| s.contains(&term)) {
        let key = Bytes::copy_from_slice(line.as_bytes());
        out.push(Item::with_inline(key_hash(&key, HASH_SIZE), key, 1))?;
    }
    Ok(cursor)
}

pub fn combine(input: ItemStore, out: &mut ItemStore, _aux: &Bytes) -> Result<()> {
    fold_equal_keys(input, out, |acc, item| {
        let total = count(&acc.value)? + count(&item.value)?;
        acc.value = ItemValue::Inline(total);
        Ok(())
    })
}

pub fn reduce(items: &ItemStore, out: &mut dyn Write, _aux: &Bytes) -> Result<()> {
    for item in items {
        let line = String::from_utf8_lossy(&item.key);
        writeln!(out, "{}:: {}", count(&item.value)?, line)?;
    }
    Ok(())
}

fn count(value: &ItemValue) -> Result<u64> {
    value.inline().context("grep expects inline counts")
}
