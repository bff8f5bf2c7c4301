// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use hubrpc_client_rs::client::receiver::NullReceiver;
use tokio::time::{Duration, timeout};

use crate::integration_tests::common::{
    connect_pair, parse_client_request, response_ok,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_reply_resolves_typed_value() -> Result<()> {
    let (conn, mut peer) = connect_pair(Arc::new(NullReceiver)).await?;

    let server = tokio::spawn(async move {
        let frame = peer.recv().await.expect("client frame");
        let (invocation_id, method_id, payload) = parse_client_request(&frame)?;
        assert_eq!(invocation_id, 1, "first id on a fresh channel");
        assert_eq!(method_id, 7);
        assert_eq!(payload, [0x01]);

        peer.send(response_ok(invocation_id, method_id, &[0x05])?)
            .await?;
        anyhow::Ok(peer)
    });

    let value: i32 = conn.write_with_response(7, &1i32).await?;
    assert_eq!(value, 5);
    assert_eq!(conn.outstanding(), 0, "registry empty after completion");

    let _peer = server.await??;
    conn.dispose().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_complete_out_of_order() -> Result<()> {
    let (conn, mut peer) = connect_pair(Arc::new(NullReceiver)).await?;

    let mut callers = Vec::new();
    for seed in [10i32, 20, 30] {
        let conn = Arc::clone(&conn);
        callers.push(tokio::spawn(async move {
            let echoed: i32 = conn.write_with_response(3, &seed).await?;
            anyhow::Ok((seed, echoed))
        }));
    }

    // Collect all three requests, then echo them back newest-first.
    let mut requests = Vec::new();
    for _ in 0..3 {
        let frame = peer.recv().await.expect("client frame");
        requests.push(parse_client_request(&frame)?);
    }
    let mut ids: Vec<i32> = requests.iter().map(|(id, _, _)| *id).collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2, 3], "ids are dense and strictly increasing");

    for (invocation_id, method_id, payload) in requests.into_iter().rev() {
        peer.send(response_ok(invocation_id, method_id, &payload)?)
            .await?;
    }

    for caller in callers {
        let (seed, echoed) = timeout(Duration::from_secs(5), caller).await???;
        assert_eq!(echoed, seed, "each caller sees its own response");
    }
    assert_eq!(conn.outstanding(), 0);

    conn.dispose().await?;
    Ok(())
}
