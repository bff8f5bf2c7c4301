// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub mod mem;
pub mod tcp;

/// Ordered send half of a duplex channel.
///
/// The connection serializes access, so implementations see one write at a
/// time and never a write after [`complete`](Self::complete).
#[async_trait]
pub trait RequestSink: Send + 'static {
    /// Write one complete frame to the send half.
    async fn write(&mut self, frame: Bytes) -> Result<()>;

    /// Half-close the send half. The receive half keeps draining.
    async fn complete(&mut self) -> Result<()>;
}

/// Ordered receive half of a duplex channel.
#[async_trait]
pub trait ResponseStream: Send + 'static {
    /// Pull the next frame. `None` means the remote closed cleanly.
    async fn next(&mut self) -> Result<Option<Bytes>>;
}

/// One logical bidirectional channel: a send half and a receive half.
pub struct DuplexStream {
    pub request: Box<dyn RequestSink>,
    pub response: Box<dyn ResponseStream>,
}

pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow!("{label} timeout")),
            }
        }
    }
}
