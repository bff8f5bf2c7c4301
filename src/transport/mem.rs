// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Channel-backed duplex carrier.
//!
//! Gives tests and in-process embeddings a real [`DuplexStream`] without a
//! socket: the returned [`MemoryPeer`] plays the server, observing every
//! frame the client writes and injecting response or broadcast frames.

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::transport::{DuplexStream, RequestSink, ResponseStream};

/// Build a connected in-memory duplex pair.
pub fn pair(capacity: usize) -> (DuplexStream, MemoryPeer) {
    let (client_tx, client_rx) = mpsc::channel(capacity);
    let (peer_tx, peer_rx) = mpsc::channel(capacity);

    let duplex = DuplexStream {
        request: Box::new(MemRequestSink {
            tx: Some(client_tx),
        }),
        response: Box::new(MemResponseStream { rx: peer_rx }),
    };
    let peer = MemoryPeer {
        rx: client_rx,
        tx: Some(peer_tx),
    };
    (duplex, peer)
}

/// The far end of an in-memory duplex channel.
pub struct MemoryPeer {
    rx: mpsc::Receiver<Bytes>,
    tx: Option<mpsc::Sender<Bytes>>,
}

impl MemoryPeer {
    /// Next frame written by the client; `None` once the client half-closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Inject a frame into the client's response stream.
    pub async fn send(&mut self, frame: impl Into<Bytes>) -> Result<()> {
        match &self.tx {
            Some(tx) => {
                tx.send(frame.into())
                    .await
                    .map_err(|_| anyhow::anyhow!("client response stream closed"))?;
                Ok(())
            },
            None => bail!("peer already closed"),
        }
    }

    /// Close the client's response stream, as a server-side shutdown would.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Refuse further client writes while keeping the response stream open,
    /// as a transport whose send path failed would.
    pub fn refuse_writes(&mut self) {
        self.rx.close();
    }
}

struct MemRequestSink {
    tx: Option<mpsc::Sender<Bytes>>,
}

#[async_trait]
impl RequestSink for MemRequestSink {
    async fn write(&mut self, frame: Bytes) -> Result<()> {
        match &self.tx {
            Some(tx) => {
                tx.send(frame)
                    .await
                    .map_err(|_| anyhow::anyhow!("peer dropped"))?;
                Ok(())
            },
            None => bail!("request stream already completed"),
        }
    }

    async fn complete(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

struct MemResponseStream {
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl ResponseStream for MemResponseStream {
    async fn next(&mut self) -> Result<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }
}
