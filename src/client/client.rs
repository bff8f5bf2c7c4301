// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, bail};
use bytes::{Bytes, BytesMut};
use once_cell::sync::OnceCell;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::config::Config,
    client::{
        error::HubError,
        pending::{PendingInvocations, ResponseWaiter},
        receiver::HubReceiver,
    },
    protocol::{
        codec::{Codec, RmpCodec},
        frame::{self, InboundFrame},
    },
    transport::{self, DuplexStream, RequestSink, ResponseStream},
};

/// A long-lived duplex hub channel multiplexing client invocations and
/// server broadcasts over one underlying stream.
///
/// Outbound traffic is serialized behind the write lock; inbound traffic is
/// consumed by a single background read task that correlates responses with
/// pending invocations and hands broadcasts to the subscribed receiver.
/// Construction is two-phase: [`from_duplex`](Self::from_duplex) builds the
/// connection, [`connect_and_subscribe`](Self::connect_and_subscribe) binds
/// the receiver and starts the read task.
pub struct HubConnection<C: Codec = RmpCodec> {
    /// Send half, serialized for concurrent callers.
    writer: Mutex<Box<dyn RequestSink>>,
    /// Receive half, parked here until the read task claims it.
    response_stream: Mutex<Option<Box<dyn ResponseStream>>>,
    codec: C,
    /// In-flight request/response invocations.
    pending: PendingInvocations,
    /// Broadcast handler, bound once on subscribe.
    receiver: OnceCell<Arc<dyn HubReceiver>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,

    /// Stops the read task, on teardown or when the caller's token fires.
    cancel: CancellationToken,
    /// Monotonic `false -> true`; the swap elects the task that runs teardown.
    disposed: AtomicBool,
    /// Published exactly once, after teardown has drained every waiter.
    disconnected: CancellationToken,
}

impl HubConnection<RmpCodec> {
    /// Open a TCP duplex channel to the configured endpoint, subscribe
    /// `receiver`, and start the read task.
    pub async fn connect(
        cfg: &Config,
        receiver: Arc<dyn HubReceiver>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let cancel = cancel.child_token();
        let duplex = transport::tcp::open_duplex(&cfg.transport, cancel.clone()).await?;
        let conn = Self::from_duplex(duplex, RmpCodec, cancel);
        conn.connect_and_subscribe(receiver).await?;
        Ok(conn)
    }
}

impl<C: Codec> HubConnection<C> {
    /// Wrap an already-open duplex channel. No read task is running yet.
    pub fn from_duplex(
        duplex: DuplexStream,
        codec: C,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            writer: Mutex::new(duplex.request),
            response_stream: Mutex::new(Some(duplex.response)),
            codec,
            pending: PendingInvocations::new(),
            receiver: OnceCell::new(),
            reader_task: Mutex::new(None),
            cancel,
            disposed: AtomicBool::new(false),
            disconnected: CancellationToken::new(),
        })
    }

    /// Bind `receiver` and launch the read task. Once per connection.
    pub async fn connect_and_subscribe(
        self: &Arc<Self>,
        receiver: Arc<dyn HubReceiver>,
    ) -> Result<()> {
        if self.receiver.set(receiver).is_err() {
            bail!("connection already subscribed");
        }
        let stream = match self.response_stream.lock().await.take() {
            Some(s) => s,
            None => bail!("read task already started"),
        };

        let conn = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = conn.read_loop(stream).await {
                warn!("read loop exited: {e:#}");
            }
            // The read task must not wait on its own join handle.
            if let Err(e) = conn.teardown(false).await {
                warn!("teardown after read loop failed: {e:#}");
            }
        });
        *self.reader_task.lock().await = Some(handle);
        Ok(())
    }

    /// Send `[method_id, payload]` and return once the transport accepted it.
    pub async fn write_fire_and_forget<T: Serialize>(
        &self,
        method_id: i32,
        message: &T,
    ) -> Result<()> {
        self.check_not_disposed()?;

        let mut payload = Vec::new();
        self.codec.encode(message, &mut payload)?;
        let mut buf = BytesMut::with_capacity(payload.len() + 8);
        frame::encode_fire_and_forget(&mut buf, method_id, &payload)?;

        self.write_frame(buf.freeze()).await
    }

    /// Send `[invocation_id, method_id, payload]` and await the correlated
    /// response, decoded as `U`.
    pub async fn write_with_response<T, U>(
        &self,
        method_id: i32,
        message: &T,
    ) -> Result<U>
    where
        T: Serialize,
        U: DeserializeOwned + Send + 'static,
    {
        self.check_not_disposed()?;

        let mut payload = Vec::new();
        self.codec.encode(message, &mut payload)?;

        let invocation_id = self.pending.next_invocation_id()?;
        let mut buf = BytesMut::with_capacity(payload.len() + 16);
        frame::encode_request(&mut buf, invocation_id, method_id, &payload)?;

        // The waiter must be registered before the frame is on the wire; the
        // response may beat the write's own return.
        let codec = self.codec.clone();
        let (waiter, rx) =
            ResponseWaiter::new(move |bytes: &[u8]| codec.decode::<U>(bytes));
        self.pending.insert(invocation_id, Box::new(waiter));

        // A teardown that drained between the disposed check and the insert
        // is visible here: take the waiter back instead of leaking it.
        if self.disposed.load(Ordering::SeqCst) {
            let _ = self.pending.take(invocation_id);
            bail!(HubError::Disposed);
        }

        if let Err(e) = self.write_frame(buf.freeze()).await {
            let _ = self.pending.take(invocation_id);
            return Err(e);
        }

        match rx.await {
            Ok(outcome) => outcome,
            // The registry went away wholesale; treat as shutdown.
            Err(_) => Err(HubError::Cancelled.into()),
        }
    }

    /// Resolved once teardown has completed, for any number of observers.
    pub async fn wait_for_disconnect(&self) {
        self.disconnected.cancelled().await;
    }

    /// Orderly shutdown: half-close, stop the read task, cancel every
    /// outstanding waiter, publish the disconnected signal. Idempotent;
    /// every caller's future resolves after teardown has completed.
    pub async fn dispose(&self) -> Result<()> {
        self.teardown(true).await
    }

    /// Number of invocations still awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn check_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            bail!(HubError::Disposed);
        }
        Ok(())
    }

    async fn write_frame(&self, bytes: Bytes) -> Result<()> {
        let mut w = self.writer.lock().await;
        // Re-check under the write lock: teardown half-closes under it.
        self.check_not_disposed()?;
        w.write(bytes).await
    }

    async fn read_loop(&self, mut stream: Box<dyn ResponseStream>) -> Result<()> {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                next = stream.next() => next?,
            };
            let Some(bytes) = next else {
                debug!("response stream ended");
                return Ok(());
            };
            self.dispatch_frame(&bytes).await;
        }
    }

    /// Route one inbound frame. One bad frame never kills the channel.
    async fn dispatch_frame(&self, bytes: &Bytes) {
        let parsed = match frame::decode_frame(bytes) {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping undecodable frame: {e:#}");
                return;
            },
        };

        match parsed {
            InboundFrame::Response {
                invocation_id,
                method_id,
                payload,
            } => {
                debug!("response for invocation {invocation_id} (method {method_id})");
                match self.pending.take(invocation_id) {
                    Some(waiter) => waiter.resolve(payload),
                    None => {
                        debug!("dropping response for unknown invocation {invocation_id}")
                    },
                }
            },
            InboundFrame::ResponseError {
                invocation_id,
                message,
            } => {
                if let Some(waiter) = self.pending.take(invocation_id) {
                    waiter.fail(HubError::Server(message.to_owned()).into());
                } else {
                    debug!("dropping error for unknown invocation {invocation_id}");
                }
            },
            InboundFrame::Broadcast { method_id, payload } => {
                let Some(receiver) = self.receiver.get() else {
                    debug!("dropping broadcast for method {method_id}: not subscribed");
                    return;
                };
                if let Err(e) = receiver
                    .on_broadcast(method_id, bytes.slice_ref(payload))
                    .await
                {
                    warn!("receiver failed for method {method_id}: {e:#}");
                }
            },
        }
    }

    async fn teardown(&self, wait_for_reader: bool) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            // Another task owns teardown; just wait for it when asked to.
            if wait_for_reader {
                self.disconnected.cancelled().await;
            }
            return Ok(());
        }

        // Half-close the request stream. Failure is expected when the
        // transport already died.
        {
            let mut w = self.writer.lock().await;
            if let Err(e) = w.complete().await {
                debug!("request stream half-close failed: {e:#}");
            }
        }

        self.cancel.cancel();

        if wait_for_reader {
            let handle = self.reader_task.lock().await.take();
            if let Some(handle) = handle {
                let joined = handle.await;
                if let Err(e) = joined {
                    warn!("read task join failed: {e}");
                }
            }
        }

        for waiter in self.pending.drain() {
            waiter.cancel();
        }

        self.disconnected.cancel();
        Ok(())
    }
}
