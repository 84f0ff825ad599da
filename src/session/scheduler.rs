//! The two recurring cycle timers.
//!
//! Each timer is a one-shot slot: arming replaces whatever was pending, and
//! a slot empties as soon as it fires. At most one scan timer and one save
//! timer exist at any time.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Scan,
    Save,
}

#[derive(Default)]
pub struct CycleTimers {
    scan: Option<Pin<Box<Sleep>>>,
    save: Option<Pin<Box<Sleep>>>,
}

impl CycleTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop both timers.
    pub fn clear(&mut self) {
        self.scan = None;
        self.save = None;
    }

    /// Arm the scan timer unless one is already pending. Returns whether it
    /// was armed.
    pub fn arm_scan_if_idle(&mut self, after: Duration) -> bool {
        if self.scan.is_some() {
            return false;
        }
        self.scan = Some(Box::pin(sleep(after)));
        true
    }

    /// Replace any pending save timer with a fresh one.
    pub fn rearm_save(&mut self, after: Duration) {
        self.save = Some(Box::pin(sleep(after)));
    }

    pub fn is_scan_pending(&self) -> bool {
        self.scan.is_some()
    }

    pub fn is_save_pending(&self) -> bool {
        self.save.is_some()
    }

    /// Resolve when either timer fires, emptying its slot. Never resolves
    /// while both are empty. Cancel-safe.
    pub async fn fired(&mut self) -> Timer {
        let timer = tokio::select! {
            _ = wait(self.scan.as_mut()) => Timer::Scan,
            _ = wait(self.save.as_mut()) => Timer::Save,
        };
        match timer {
            Timer::Scan => self.scan = None,
            Timer::Save => self.save = None,
        }
        timer
    }
}

async fn wait(slot: Option<&mut Pin<Box<Sleep>>>) {
    match slot {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}
