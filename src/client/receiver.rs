// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Handler for server-initiated broadcasts.
///
/// The read loop awaits [`on_broadcast`](Self::on_broadcast) before pulling
/// the next frame, so implementations must not block indefinitely or they
/// starve the channel. A returned error is logged and the channel continues;
/// it never affects pending invocations.
///
/// Dispatch from `method_id` to a typed callback is the implementor's
/// concern, typically a generated match over the service's broadcast methods
/// that decodes `payload` with the connection's body codec.
#[async_trait]
pub trait HubReceiver: Send + Sync + 'static {
    async fn on_broadcast(&self, method_id: i32, payload: Bytes) -> Result<()>;
}

/// Receiver for connections that subscribe to no broadcasts.
///
/// Every broadcast is dropped after a debug log entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReceiver;

#[async_trait]
impl HubReceiver for NullReceiver {
    async fn on_broadcast(&self, method_id: i32, _payload: Bytes) -> Result<()> {
        tracing::debug!("dropping broadcast for method {method_id}: no receiver");
        Ok(())
    }
}
