//! Utility functions that may be helpful for implementing
//! and testing MapReduce applications.
//!

use anyhow::Result;
use bytes::Bytes;
use std::fmt::Write;

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    Ok(String::from_utf8(buf.as_ref().into())?)
}

/// Convert a [`String`] to [`Bytes`].
#[inline]
pub fn string_to_bytes(s: String) -> Bytes {
    Bytes::from(s)
}

/// Lowercase hex rendering of a byte slice.
pub fn hex(buf: &[u8]) -> String {
    let mut s = String::with_capacity(buf.len() * 2);
    for b in buf {
        // writing into a String cannot fail
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Installs the log subscriber used by the binaries.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Logs go to
/// standard error so they never mix with reduce output on standard output.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Serializes workload arguments the way the binaries pass them on.
pub fn serialize_args(args: &[String]) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(args)?))
}
