// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TCP carrier for the hub channel.
//!
//! Frames travel length-prefixed: a 4-byte big-endian length followed by the
//! frame bytes. The send half serializes writes behind the connection's write
//! lock; the receive half is consumed only by the connection's read task.

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cfg::config::TransportConfig,
    transport::{DuplexStream, RequestSink, ResponseStream, io_with_timeout},
};

const LEN_PREFIX: usize = 4;

/// Open a duplex channel to `cfg.endpoint` over a fresh TCP connection.
pub async fn open_duplex(
    cfg: &TransportConfig,
    cancel: CancellationToken,
) -> Result<DuplexStream> {
    let stream = timeout(cfg.timeout_connection, TcpStream::connect(&cfg.endpoint))
        .await
        .map_err(|_| anyhow::anyhow!("connect to {} timed out", cfg.endpoint))??;
    stream.set_linger(None)?;
    stream.set_nodelay(true)?;

    let (r, w) = stream.into_split();
    debug!("duplex channel open to {}", cfg.endpoint);

    Ok(DuplexStream {
        request: Box::new(TcpRequestSink {
            writer: w,
            cfg: cfg.clone(),
            cancel: cancel.clone(),
        }),
        response: Box::new(TcpResponseStream {
            reader: r,
            cfg: cfg.clone(),
            cancel,
        }),
    })
}

struct TcpRequestSink {
    writer: OwnedWriteHalf,
    cfg: TransportConfig,
    cancel: CancellationToken,
}

#[async_trait]
impl RequestSink for TcpRequestSink {
    async fn write(&mut self, frame: Bytes) -> Result<()> {
        if frame.len() > self.cfg.max_frame_length as usize {
            bail!(
                "frame of {} bytes exceeds MaxFrameLength {}",
                frame.len(),
                self.cfg.max_frame_length
            );
        }

        let len = (frame.len() as u32).to_be_bytes();
        io_with_timeout(
            "write frame length",
            self.writer.write_all(&len),
            self.cfg.timeout_io,
            &self.cancel,
        )
        .await?;
        io_with_timeout(
            "write frame body",
            self.writer.write_all(&frame),
            self.cfg.timeout_io,
            &self.cancel,
        )
        .await?;
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        // FIN on the send half; the remote keeps its half open until it is
        // done replying.
        self.writer.shutdown().await?;
        Ok(())
    }
}

struct TcpResponseStream {
    reader: OwnedReadHalf,
    cfg: TransportConfig,
    cancel: CancellationToken,
}

#[async_trait]
impl ResponseStream for TcpResponseStream {
    async fn next(&mut self) -> Result<Option<Bytes>> {
        // No timeout on the length prefix: an idle hub channel is normal and
        // may sit for minutes between broadcasts.
        let mut len_buf = [0u8; LEN_PREFIX];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.cfg.max_frame_length as usize {
            bail!("inbound frame of {len} bytes exceeds MaxFrameLength");
        }

        let mut body = BytesMut::zeroed(len);
        io_with_timeout(
            "read frame body",
            self.reader.read_exact(&mut body),
            self.cfg.timeout_io,
            &self.cancel,
        )
        .await?;
        Ok(Some(body.freeze()))
    }
}
