// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event pump: keeps `process_events` running while calls are outstanding.

use super::BridgeInner;
use crate::error::{AbiError, AbiResult};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Who drives `process_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpScheduler {
    /// The host calls [`crate::CallbackBridge::tick`] itself.
    #[default]
    Manual,
    /// A `spawn_local` task ticks every `interval_ms` while work is pending.
    LocalTask { interval_ms: u64 },
}

impl PumpScheduler {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Manual => None,
            Self::LocalTask { interval_ms } => Some(Duration::from_millis(*interval_ms)),
        }
    }
}

/// Reference-counted pump obligation for one bridge instance.
#[derive(Debug)]
pub struct EventPump {
    outstanding: Cell<usize>,
    ticking: Cell<bool>,
    scheduler: PumpScheduler,
}

impl EventPump {
    pub fn new(scheduler: PumpScheduler) -> Self {
        Self {
            outstanding: Cell::new(0),
            ticking: Cell::new(false),
            scheduler,
        }
    }

    pub fn scheduler(&self) -> PumpScheduler {
        self.scheduler
    }

    /// Outstanding obligations.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    /// Whether a local tick task is alive.
    pub fn is_ticking(&self) -> bool {
        self.ticking.get()
    }

    /// Take one obligation. Returns the tick interval when the caller must
    /// start a new local task.
    pub fn acquire(&self) -> Option<Duration> {
        self.outstanding.set(self.outstanding.get() + 1);
        let interval = self.scheduler.interval()?;
        if self.ticking.replace(true) {
            return None;
        }
        Some(interval)
    }

    /// Drop one obligation.
    pub fn release(&self) {
        match self.outstanding.get() {
            0 => log::error!("event pump released more often than acquired"),
            n => self.outstanding.set(n - 1),
        }
    }

    pub(crate) fn stopped(&self) {
        self.ticking.set(false);
    }
}

/// Start the local tick loop for `bridge`.
///
/// # Errors
/// [`AbiError::PumpUnavailable`] when the current thread is not running a
/// `tokio::task::LocalSet`. Nothing is spawned in that case.
pub(crate) fn spawn_tick_task(bridge: &Rc<BridgeInner>, interval: Duration) -> AbiResult<()> {
    let weak = Rc::downgrade(bridge);
    // spawn_local panics outside a LocalSet.
    let spawned = panic::catch_unwind(AssertUnwindSafe(|| {
        tokio::task::spawn_local(tick_loop(weak, interval));
    }));
    if spawned.is_err() {
        return Err(AbiError::PumpUnavailable(
            "LocalTask scheduler needs a tokio LocalSet on the bridge thread".to_string(),
        ));
    }
    log::debug!("event pump task started ({:?})", interval);
    Ok(())
}

async fn tick_loop(weak: std::rc::Weak<BridgeInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(bridge) = weak.upgrade() else {
            break;
        };
        match bridge.tick() {
            Ok(true) => {}
            Ok(false) => {
                bridge.pump.stopped();
                log::debug!("event pump task idle, stopping");
                break;
            }
            Err(e) => {
                bridge.pump.stopped();
                log::error!("event pump task stopped: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_never_requests_task() {
        let pump = EventPump::new(PumpScheduler::Manual);
        assert_eq!(pump.acquire(), None);
        assert_eq!(pump.acquire(), None);
        assert_eq!(pump.outstanding(), 2);
        pump.release();
        pump.release();
        assert_eq!(pump.outstanding(), 0);
    }

    #[test]
    fn test_local_task_requested_once() {
        let pump = EventPump::new(PumpScheduler::LocalTask { interval_ms: 5 });
        assert_eq!(pump.acquire(), Some(Duration::from_millis(5)));
        assert_eq!(pump.acquire(), None);
        assert!(pump.is_ticking());
        pump.stopped();
        assert_eq!(pump.acquire(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_release_underflow_saturates() {
        let pump = EventPump::new(PumpScheduler::Manual);
        pump.release();
        assert_eq!(pump.outstanding(), 0);
    }
}
