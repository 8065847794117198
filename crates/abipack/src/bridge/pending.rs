// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-family pending maps and the caller-side future.

use super::{BridgeInner, Completion};
use crate::error::{AbiError, AbiResult};
use crate::layout::StructLayout;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};

pub(crate) type Settlement = AbiResult<Completion>;

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) sender: oneshot::Sender<Settlement>,
    pub(crate) response: Option<Arc<StructLayout>>,
}

/// State of one operation family (request-adapter, map-buffer, ...).
#[derive(Debug)]
pub(crate) struct FamilyState {
    pub(crate) name: String,
    next_id: u32,
    pending: HashMap<u32, PendingRequest>,
    abandoned: HashSet<u32>,
}

impl FamilyState {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 1,
            pending: HashMap::new(),
            abandoned: HashSet::new(),
        }
    }

    /// Next request id. Ids wrap but skip 0 and any id still in use.
    pub(crate) fn next_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.pending.contains_key(&id) && !self.abandoned.contains(&id) {
                return id;
            }
        }
    }

    pub(crate) fn insert(&mut self, id: u32, request: PendingRequest) {
        self.pending.insert(id, request);
    }

    /// Remove the entry for settling.
    pub(crate) fn take(&mut self, id: u32) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Forget an abandoned id once its late callback shows up.
    pub(crate) fn forget_abandoned(&mut self, id: u32) -> bool {
        self.abandoned.remove(&id)
    }

    /// Move a pending id into the abandoned set.
    pub(crate) fn abandon(&mut self, id: u32) -> bool {
        if self.pending.remove(&id).is_some() {
            self.abandoned.insert(id);
            true
        } else {
            false
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn abandoned_len(&self) -> usize {
        self.abandoned.len()
    }
}

/// Future of one in-flight native call.
///
/// Resolves once the native callback settles it, or with
/// [`AbiError::Timeout`] when a deadline passes first. Dropping it before
/// settlement does not cancel the native operation; the late callback is
/// still consumed and discarded.
#[derive(Debug)]
pub struct PendingCall {
    receiver: oneshot::Receiver<Settlement>,
    bridge: Weak<BridgeInner>,
    family: usize,
    family_name: String,
    id: u32,
    timeout: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl PendingCall {
    pub(crate) fn new(
        receiver: oneshot::Receiver<Settlement>,
        bridge: Weak<BridgeInner>,
        family: usize,
        family_name: String,
        id: u32,
    ) -> Self {
        Self {
            receiver,
            bridge,
            family,
            family_name,
            id,
            timeout: None,
            sleep: None,
        }
    }

    /// Reject locally when no callback has arrived within `timeout`.
    ///
    /// The clock starts at the first poll.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.sleep = None;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn family(&self) -> &str {
        &self.family_name
    }
}

impl Future for PendingCall {
    type Output = Settlement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(result) = Pin::new(&mut this.receiver).poll(cx) {
            return Poll::Ready(result.unwrap_or(Err(AbiError::BridgeClosed)));
        }

        let Some(timeout) = this.timeout else {
            return Poll::Pending;
        };
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(Instant::now() + timeout)));
        if sleep.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        // The callback may have landed in the same turn as the deadline.
        if let Ok(result) = this.receiver.try_recv() {
            return Poll::Ready(result);
        }
        if let Some(bridge) = this.bridge.upgrade() {
            bridge.abandon(this.family, this.id);
        }
        log::debug!(
            "{} #{} timed out after {:?}",
            this.family_name,
            this.id,
            timeout
        );
        this.timeout = None;
        Poll::Ready(Err(AbiError::Timeout {
            family: this.family_name.clone(),
            id: this.id,
        }))
    }
}
