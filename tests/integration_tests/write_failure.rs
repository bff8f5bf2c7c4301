// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use hubrpc_client_rs::client::receiver::NullReceiver;

use crate::integration_tests::common::connect_pair;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_write_unregisters_the_waiter() -> Result<()> {
    let (conn, mut peer) = connect_pair(Arc::new(NullReceiver)).await?;

    peer.refuse_writes();

    let err = conn
        .write_with_response::<i32, i32>(4, &1)
        .await
        .expect_err("transport refused the frame");
    assert!(
        format!("{err:#}").contains("peer dropped"),
        "caller sees the transport error, got: {err:#}"
    );
    assert_eq!(conn.outstanding(), 0, "no orphaned registry entry");

    // The connection is not disposed by a failed write.
    assert!(!conn.is_disposed());

    let err = conn
        .write_fire_and_forget(4, &true)
        .await
        .expect_err("transport still refuses");
    assert!(format!("{err:#}").contains("peer dropped"));

    conn.dispose().await?;
    Ok(())
}
