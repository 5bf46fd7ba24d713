//! How blocking waits pause between checks.
//!
//! Reachability and idleness change on human timescales, so waits are loops of
//! "check, then pause". [`PollWaiter`] pauses for a fixed interval; [`EventWaiter`] pauses
//! until a network-state callback signals a change or the fallback interval elapses.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

pub trait Waiter: Send + Sync {
    /// Block until the next check is due.
    fn pause(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct PollWaiter {
    interval: Duration,
}

impl PollWaiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Waiter for PollWaiter {
    fn pause(&self) {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
    }
}

/// Wakes early when notified through a [`WakeHandle`].
#[derive(Debug)]
pub struct EventWaiter {
    rx: Mutex<Receiver<()>>,
    fallback: Duration,
}

/// Cloneable handle given to whatever observes network state changes.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    tx: Sender<()>,
}

impl WakeHandle {
    pub fn wake(&self) {
        let _ = self.tx.send(());
    }
}

impl EventWaiter {
    pub fn new(fallback: Duration) -> (Self, WakeHandle) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx: Mutex::new(rx),
                fallback,
            },
            WakeHandle { tx },
        )
    }
}

impl Waiter for EventWaiter {
    fn pause(&self) {
        let rx = match self.rx.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };
        match rx.recv_timeout(self.fallback) {
            Ok(()) => {
                // Coalesce a burst of notifications into one wakeup.
                while rx.try_recv().is_ok() {}
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // No notifier left: behave like a poll waiter.
                drop(rx);
                std::thread::sleep(self.fallback);
            }
        }
    }
}
