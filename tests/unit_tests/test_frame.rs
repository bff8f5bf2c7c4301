// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;

use anyhow::Result;
use bytes::BytesMut;
use hex::FromHex;
use hex_literal::hex;
use hubrpc_client_rs::protocol::frame::{
    InboundFrame, decode_frame, encode_fire_and_forget, encode_request,
};

// Helper to load a hex fixture and decode it to a byte vector.
fn load_fixture(path: &str) -> Result<Vec<u8>> {
    let s = fs::read_to_string(path)?;
    let cleaned = s.trim().replace(|c: char| c.is_whitespace(), "");
    Ok(Vec::from_hex(&cleaned)?)
}

#[test]
fn request_wire_shape() -> Result<()> {
    let mut buf = BytesMut::new();
    let written = encode_request(&mut buf, 1, 7, &[0x05])?;

    assert_eq!(written, buf.len());
    // [1, 7] as fixints, then the raw payload byte.
    assert_eq!(&buf[..], hex!("93 01 07 05"));
    Ok(())
}

#[test]
fn fire_and_forget_wire_shape() -> Result<()> {
    let mut buf = BytesMut::new();
    encode_fire_and_forget(&mut buf, 42, &hex!("a3 66 6f 6f"))?;

    assert_eq!(&buf[..], hex!("92 2a a3 66 6f 6f"));
    Ok(())
}

#[test]
fn request_roundtrips_as_response() -> Result<()> {
    let mut buf = BytesMut::new();
    encode_request(&mut buf, 300, -2, &hex!("de ad"))?;

    let frame = decode_frame(&buf)?;
    assert_eq!(frame, InboundFrame::Response {
        invocation_id: 300,
        method_id: -2,
        payload: &hex!("de ad"),
    });
    Ok(())
}

#[test]
fn fire_and_forget_roundtrips_as_broadcast() -> Result<()> {
    let mut buf = BytesMut::new();
    encode_fire_and_forget(&mut buf, 42, &[])?;

    let frame = decode_frame(&buf)?;
    assert_eq!(frame, InboundFrame::Broadcast {
        method_id: 42,
        payload: &[],
    });
    Ok(())
}

#[test]
fn extreme_ids_roundtrip() -> Result<()> {
    let mut buf = BytesMut::new();
    encode_request(&mut buf, i32::MAX, i32::MIN, &[])?;

    let frame = decode_frame(&buf)?;
    assert_eq!(frame, InboundFrame::Response {
        invocation_id: i32::MAX,
        method_id: i32::MIN,
        payload: &[],
    });
    Ok(())
}

#[test]
fn error_frame_decodes_message() -> Result<()> {
    // [2, nil, "boom"]
    let bytes = hex!("93 02 c0 a4 62 6f 6f 6d");

    let frame = decode_frame(&bytes)?;
    assert_eq!(frame, InboundFrame::ResponseError {
        invocation_id: 2,
        message: "boom",
    });
    Ok(())
}

#[test]
fn response_fixture_decodes() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/frames/response_ok.hex")?;

    let frame = decode_frame(&bytes)?;
    assert_eq!(frame, InboundFrame::Response {
        invocation_id: 1,
        method_id: 7,
        payload: &[0x05],
    });
    Ok(())
}

#[test]
fn error_fixture_decodes() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/frames/response_error.hex")?;

    let frame = decode_frame(&bytes)?;
    assert_eq!(frame, InboundFrame::ResponseError {
        invocation_id: 2,
        message: "boom",
    });
    Ok(())
}

#[test]
fn rejects_unknown_arity() {
    // array(5) is no shape of this protocol
    let bytes = hex!("95 01 02 03 04 05");
    assert!(decode_frame(&bytes).is_err());
}

#[test]
fn rejects_truncated_frame() {
    // array(3) with only the invocation id present
    let bytes = hex!("93 01");
    assert!(decode_frame(&bytes).is_err());
}

#[test]
fn rejects_non_array_frame() {
    // a bare string is not an envelope
    let bytes = hex!("a4 62 6f 6f 6d");
    assert!(decode_frame(&bytes).is_err());
}
