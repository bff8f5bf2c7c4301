// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Encoding / decoding of the hub **frame envelope**.
//!
//! Every frame is a MessagePack array whose leading header discriminates the
//! shape:
//!
//! ```text
//! [invocation_id, method_id, payload]   array(3), request or response
//! [invocation_id, nil, error_message]   array(3), server-side failure
//! [method_id, payload]                  array(2), fire-and-forget / broadcast
//! ```
//!
//! The integer fields use the most compact MessagePack representation; the
//! payload is **raw bytes appended after the header elements**, already
//! encoded by the body codec, and is returned as a sub-slice of the input on
//! decode. Callers must consume the slice before reusing the read buffer.

use anyhow::{Result, anyhow, bail};
use bytes::{BufMut, BytesMut};
use rmp::Marker;

/// A frame received from the server, borrowed from the read buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    /// Successful completion of the invocation registered at `invocation_id`.
    Response {
        invocation_id: i32,
        method_id: i32,
        payload: &'a [u8],
    },
    /// Server-side failure of the invocation registered at `invocation_id`.
    ResponseError {
        invocation_id: i32,
        message: &'a str,
    },
    /// Server-initiated message not tied to any client invocation.
    Broadcast { method_id: i32, payload: &'a [u8] },
}

/// Append `[invocation_id, method_id, payload]` to `buf`.
///
/// Returns the number of bytes appended.
pub fn encode_request(
    buf: &mut BytesMut,
    invocation_id: i32,
    method_id: i32,
    payload: &[u8],
) -> Result<usize> {
    let start = buf.len();
    let mut wr = buf.writer();
    rmp::encode::write_array_len(&mut wr, 3)?;
    rmp::encode::write_sint(&mut wr, invocation_id as i64)?;
    rmp::encode::write_sint(&mut wr, method_id as i64)?;
    let buf = wr.into_inner();
    buf.extend_from_slice(payload);
    Ok(buf.len() - start)
}

/// Append `[method_id, payload]` to `buf`.
///
/// Returns the number of bytes appended.
pub fn encode_fire_and_forget(
    buf: &mut BytesMut,
    method_id: i32,
    payload: &[u8],
) -> Result<usize> {
    let start = buf.len();
    let mut wr = buf.writer();
    rmp::encode::write_array_len(&mut wr, 2)?;
    rmp::encode::write_sint(&mut wr, method_id as i64)?;
    let buf = wr.into_inner();
    buf.extend_from_slice(payload);
    Ok(buf.len() - start)
}

/// Parse one inbound frame out of `bytes`.
///
/// The payload (or error message) borrows from `bytes`; a frame whose array
/// header is neither 2 nor 3 is a protocol violation.
pub fn decode_frame(bytes: &[u8]) -> Result<InboundFrame<'_>> {
    let mut rd = bytes;
    let len = rmp::decode::read_array_len(&mut rd)
        .map_err(|e| anyhow!("bad frame header: {e}"))?;

    match len {
        3 => {
            let invocation_id: i32 = rmp::decode::read_int(&mut rd)
                .map_err(|e| anyhow!("bad invocation id: {e}"))?;
            match rd.first().map(|b| Marker::from_u8(*b)) {
                Some(Marker::Null) => {
                    rd = &rd[1..];
                    let (message, _) = rmp::decode::read_str_from_slice(rd)
                        .map_err(|e| anyhow!("bad error message: {e:?}"))?;
                    Ok(InboundFrame::ResponseError {
                        invocation_id,
                        message,
                    })
                },
                Some(_) => {
                    let method_id: i32 = rmp::decode::read_int(&mut rd)
                        .map_err(|e| anyhow!("bad method id: {e}"))?;
                    Ok(InboundFrame::Response {
                        invocation_id,
                        method_id,
                        payload: rd,
                    })
                },
                None => bail!("truncated frame: missing second element"),
            }
        },
        2 => {
            let method_id: i32 = rmp::decode::read_int(&mut rd)
                .map_err(|e| anyhow!("bad method id: {e}"))?;
            Ok(InboundFrame::Broadcast {
                method_id,
                payload: rd,
            })
        },
        other => bail!("unsupported frame arity: {other}"),
    }
}
