//! Snapshot scheduler.
//!
//! Snapshots are requested from two places: the main loop (at boot and before each
//! maintenance cycle) and a periodic background thread. [`SnapshotTrigger`] serializes
//! them so the two never run the external operation at the same time.

use crate::collaborators::{IdleProbe, Snapshotter};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct SnapshotTrigger {
    snapshotter: Arc<dyn Snapshotter>,
    idle: Arc<dyn IdleProbe>,
    enabled: bool,
    running: Mutex<()>,
}

impl SnapshotTrigger {
    pub fn new(snapshotter: Arc<dyn Snapshotter>, idle: Arc<dyn IdleProbe>, enabled: bool) -> Self {
        Self {
            snapshotter,
            idle,
            enabled,
            running: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take a snapshot right away, waiting for any snapshot already in progress.
    pub fn snapshot_now(&self) {
        if !self.enabled {
            return;
        }
        let _running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log::info!("Taking snapshot");
        match self.snapshotter.snapshot() {
            Ok(()) => log::info!("Snapshot complete"),
            Err(err) => log::error!("Snapshot failed: {:#}", err),
        }
    }

    /// Periodic variant: first give the host a chance to go idle.
    pub fn scheduled(&self) {
        if !self.enabled {
            return;
        }
        if !self.idle.wait_for_idle() {
            log::info!("Host idleness not confirmed; taking snapshot anyway");
        }
        self.snapshot_now();
    }
}

/// Handle to the periodic snapshot thread. Dropping it stops the thread.
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the thread. A snapshot in progress is allowed to finish.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Snapshot scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep `total` in slices, returning early (with `false`) once `stop` is set.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Start the periodic snapshot thread.
pub fn spawn_scheduler(trigger: Arc<SnapshotTrigger>, interval: Duration) -> Result<SchedulerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name("snapshots".to_string())
        .spawn(move || {
            log::info!("Snapshot scheduler started ({}s interval)", interval.as_secs());
            while sleep_unless_stopped(interval, &thread_stop) {
                trigger.scheduled();
            }
            log::info!("Snapshot scheduler stopped");
        })
        .context("Failed to start snapshot scheduler")?;
    Ok(SchedulerHandle {
        stop,
        thread: Some(thread),
    })
}
