// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::{Result, bail};
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::client::error::HubError;

/// A type-erased one-shot completion handle for an in-flight invocation.
///
/// The registry stores every pending call uniformly; the concrete waiter
/// embeds the typed decoder, so resolving is a single dynamic call from the
/// read loop. All transitions are terminal and consume the handle, which
/// makes repeated completion attempts impossible by construction.
pub trait Completable: Send + Sync {
    /// Decode `payload` and complete the waiter with the typed value.
    ///
    /// A decode failure completes the waiter with [`HubError::Decode`]; it is
    /// never surfaced to the read loop.
    fn resolve(self: Box<Self>, payload: &[u8]);

    /// Complete the waiter with `err`.
    fn fail(self: Box<Self>, err: anyhow::Error);

    /// Terminate the waiter because the channel is shutting down.
    fn cancel(self: Box<Self>) {
        self.fail(HubError::Cancelled.into());
    }
}

/// Waiter for one request/response invocation, typed at the call site.
pub(crate) struct ResponseWaiter<U, F> {
    tx: oneshot::Sender<Result<U>>,
    decode: F,
}

impl<U, F> ResponseWaiter<U, F>
where F: FnOnce(&[u8]) -> Result<U>
{
    pub(crate) fn new(decode: F) -> (Self, oneshot::Receiver<Result<U>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx, decode }, rx)
    }
}

impl<U, F> Completable for ResponseWaiter<U, F>
where
    U: Send + 'static,
    F: FnOnce(&[u8]) -> Result<U> + Send + Sync,
{
    fn resolve(self: Box<Self>, payload: &[u8]) {
        let this = *self;
        let outcome = (this.decode)(payload)
            .map_err(|e| anyhow::Error::from(HubError::Decode(format!("{e:#}"))));
        // The caller may have stopped waiting; a dead receiver is fine.
        let _ = this.tx.send(outcome);
    }

    fn fail(self: Box<Self>, err: anyhow::Error) {
        let _ = self.tx.send(Err(err));
    }
}

/// Per-connection invocation id allocator and waiter registry.
///
/// Ids are handed out strictly monotonically starting from 1 and are never
/// reused within a connection's lifetime. Lookup and removal are atomic, so a
/// response arriving concurrently with teardown completes its waiter exactly
/// once.
pub struct PendingInvocations {
    seq: AtomicI32,
    map: DashMap<i32, Box<dyn Completable>>,
}

impl PendingInvocations {
    pub fn new() -> Self {
        Self {
            seq: AtomicI32::new(0),
            map: DashMap::new(),
        }
    }

    /// Allocate the next invocation id.
    ///
    /// A connection that exhausts the 32-bit id space is terminal.
    pub fn next_invocation_id(&self) -> Result<i32> {
        match self.seq.fetch_add(1, Ordering::SeqCst).checked_add(1) {
            Some(id) => Ok(id),
            None => bail!("invocation id space exhausted"),
        }
    }

    /// Register a freshly allocated invocation.
    ///
    /// Must be visible before the corresponding write reaches the transport;
    /// the response may race the writer's own await.
    pub fn insert(&self, invocation_id: i32, waiter: Box<dyn Completable>) {
        self.map.insert(invocation_id, waiter);
    }

    /// Atomically remove and return the waiter for `invocation_id`.
    pub fn take(&self, invocation_id: i32) -> Option<Box<dyn Completable>> {
        self.map.remove(&invocation_id).map(|(_, w)| w)
    }

    /// Remove every registered waiter. Used only during teardown.
    pub fn drain(&self) -> Vec<Box<dyn Completable>> {
        let ids: Vec<i32> = self.map.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for PendingInvocations {
    fn default() -> Self {
        Self::new()
    }
}
