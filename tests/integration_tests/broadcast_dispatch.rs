// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use hex_literal::hex;
use hubrpc_client_rs::client::receiver::NullReceiver;

use crate::integration_tests::common::{
    FailingReceiver, RecordingReceiver, broadcast, connect_pair, parse_client_request,
    response_ok,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_reaches_the_receiver_once() -> Result<()> {
    let (receiver, mut events) = RecordingReceiver::new();
    let (conn, mut peer) = connect_pair(receiver).await?;

    peer.send(broadcast(42, &hex!("cd 04 d2"))?).await?;

    let (method_id, payload) = events.recv().await.expect("broadcast delivered");
    assert_eq!(method_id, 42);
    assert_eq!(&payload[..], hex!("cd 04 d2"));
    assert_eq!(conn.outstanding(), 0, "no waiter involved");

    conn.dispose().await?;
    assert!(events.recv().await.is_none(), "exactly one delivery");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_does_not_touch_pending_waiters() -> Result<()> {
    let (receiver, mut events) = RecordingReceiver::new();
    let (conn, mut peer) = connect_pair(receiver).await?;

    let caller = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.write_with_response::<i32, i32>(7, &1).await })
    };

    let frame = peer.recv().await.expect("client frame");
    let (invocation_id, method_id, _) = parse_client_request(&frame)?;

    // Interleave a broadcast while the call is outstanding.
    peer.send(broadcast(42, &[0xc3])?).await?;
    let (bcast_method, _) = events.recv().await.expect("broadcast delivered");
    assert_eq!(bcast_method, 42);
    assert_eq!(conn.outstanding(), 1, "waiter still pending");

    peer.send(response_ok(invocation_id, method_id, &[0x05])?)
        .await?;
    assert_eq!(caller.await??, 5);

    conn.dispose().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receiver_failure_does_not_kill_the_channel() -> Result<()> {
    let (conn, mut peer) = connect_pair(Arc::new(FailingReceiver)).await?;

    peer.send(broadcast(42, &[0xc3])?).await?;

    // The channel must survive the receiver error and serve this call.
    let server = tokio::spawn(async move {
        let frame = peer.recv().await.expect("client frame");
        let (invocation_id, method_id, _) = parse_client_request(&frame)?;
        peer.send(response_ok(invocation_id, method_id, &[0x05])?)
            .await?;
        anyhow::Ok(peer)
    });

    let value: i32 = conn.write_with_response(7, &1i32).await?;
    assert_eq!(value, 5);

    let _peer = server.await??;
    conn.dispose().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn null_receiver_swallows_broadcasts() -> Result<()> {
    let (conn, mut peer) = connect_pair(Arc::new(NullReceiver)).await?;

    peer.send(broadcast(42, &[0xc3])?).await?;

    let server = tokio::spawn(async move {
        let frame = peer.recv().await.expect("client frame");
        let (invocation_id, method_id, _) = parse_client_request(&frame)?;
        peer.send(response_ok(invocation_id, method_id, &[0x01])?)
            .await?;
        anyhow::Ok(peer)
    });

    let value: i32 = conn.write_with_response(7, &1i32).await?;
    assert_eq!(value, 1);

    let _peer = server.await??;
    conn.dispose().await?;
    Ok(())
}
