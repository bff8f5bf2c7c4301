// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Body codec seam.
//!
//! The frame envelope treats invocation payloads as opaque bytes; a [`Codec`]
//! turns typed request/response values into those bytes and back. The crate
//! ships [`RmpCodec`] (MessagePack via `rmp-serde`) as the default; a codec
//! that applies a compression wrapper can be substituted without touching the
//! connection core.

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

/// Serialization strategy for invocation payloads.
///
/// Implementations must be cheap to clone; the connection hands a clone to
/// every pending invocation so the response can be decoded on arrival.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Append the encoded form of `value` to `buf`.
    fn encode<T: Serialize>(&self, value: &T, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value of type `T` from `bytes`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// MessagePack body codec, the crate default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmpCodec;

impl Codec for RmpCodec {
    fn encode<T: Serialize>(&self, value: &T, buf: &mut Vec<u8>) -> Result<()> {
        let mut ser = rmp_serde::Serializer::new(buf);
        value
            .serialize(&mut ser)
            .context("failed to encode payload")?;
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).context("failed to decode payload")
    }
}
