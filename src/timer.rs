use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// A single tracked one-shot timer.
///
/// Arming replaces whatever was pending. Each arm bumps the epoch, and a fired
/// callback must pass it to `complete` under the owner's lock before acting, so a
/// timer that was already waiting on that lock when it got cleared still does
/// nothing.
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    epoch: u64,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            epoch: 0,
        }
    }

    /// Arm the slot to fire after `delay`
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.arm_at(Instant::now() + delay, on_fire)
    }

    /// Arm the slot to fire at `deadline`; a deadline in the past fires on the next tick
    pub fn arm_at<F>(&mut self, deadline: Instant, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.clear();
        let epoch = self.epoch;

        self.handle = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            on_fire(epoch);
        }));

        epoch
    }

    /// Cancel any pending callback
    pub fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Cleared {} timer", self.name);
        }
    }

    /// Called by a fired callback once it owns the lock; returns false for stale fires
    pub fn complete(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
