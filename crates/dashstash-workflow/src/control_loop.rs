//! The supervisory control loop.
//!
//! Boot, then alternate forever between the host owning the images and local
//! maintenance. Ownership moves only through [`GadgetManager`], so the images are never
//! mounted locally while the gadget exposes them.

use crate::phase::LoopPhase;
use anyhow::Result;
use dashstash_core::archive::Archiver;
use dashstash_core::collaborators::{
    ArchiveTransport, IdleProbe, KeepAwake, Notifier, Snapshotter,
};
use dashstash_core::config::Config;
use dashstash_core::gadget::GadgetManager;
use dashstash_core::host;
use dashstash_core::logging;
use dashstash_core::mounts::MountManager;
use dashstash_core::ownership::{HostAttached, LocalAccess};
use dashstash_core::reachability::{ReachabilityMonitor, ReachabilityProbe, SimulationMarkers};
use dashstash_core::retry::RetryBudget;
use dashstash_core::snapshots::{spawn_scheduler, SchedulerHandle, SnapshotTrigger};
use dashstash_core::status_led::StatusIndicator;
use dashstash_core::volumes::Volumes;
use dashstash_core::waiter::Waiter;
use dashstash_hal::SystemHal;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators the loop delegates to. Production values come from
/// [`crate::wiring::production_parts`].
pub struct LoopParts {
    pub probe: Arc<dyn ReachabilityProbe>,
    pub waiter: Box<dyn Waiter>,
    pub transport: Arc<dyn ArchiveTransport>,
    pub keep_awake: Arc<dyn KeepAwake>,
    pub notifier: Arc<dyn Notifier>,
    pub snapshotter: Arc<dyn Snapshotter>,
    pub idle: Arc<dyn IdleProbe>,
    pub indicator: Box<dyn StatusIndicator>,
}

pub struct ControlLoop {
    cfg: Arc<Config>,
    hal: Arc<dyn SystemHal>,
    volumes: Volumes,
    mounts: Arc<MountManager>,
    gadget: GadgetManager,
    monitor: ReachabilityMonitor,
    archiver: Archiver,
    indicator: Box<dyn StatusIndicator>,
    snapshots: Arc<SnapshotTrigger>,
    scheduler: Option<SchedulerHandle>,
    phase: LoopPhase,
    cycles: u64,
}

impl ControlLoop {
    pub fn new(cfg: Arc<Config>, hal: Arc<dyn SystemHal>, parts: LoopParts) -> Self {
        let timing = &cfg.timing;
        let volumes = Volumes::from_config(&cfg.volumes);
        let mounts = Arc::new(MountManager::new(
            Arc::clone(&hal),
            RetryBudget::new(timing.mount_attempts, timing.retry_interval()),
        ));
        let gadget = GadgetManager::new(
            Arc::clone(&hal),
            cfg.gadget.clone(),
            volumes.clone(),
            Arc::clone(&mounts),
        );
        let monitor = ReachabilityMonitor::new(
            parts.probe,
            parts.waiter,
            SimulationMarkers::from(&cfg.markers),
            RetryBudget::new(timing.unreachable_attempts, timing.retry_interval()),
        );
        let archiver = Archiver::new(
            Arc::clone(&mounts),
            volumes.clone(),
            cfg.archive.clip_dirs.clone(),
            parts.transport,
            parts.keep_awake,
            parts.notifier,
            cfg.notify.title.clone(),
            Duration::from_secs(timing.music_check_timeout_secs),
        );
        let snapshots = Arc::new(SnapshotTrigger::new(
            parts.snapshotter,
            parts.idle,
            cfg.snapshots.enabled,
        ));

        Self {
            cfg,
            hal,
            volumes,
            mounts,
            gadget,
            monitor,
            archiver,
            indicator: parts.indicator,
            snapshots,
            scheduler: None,
            phase: LoopPhase::Booting,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Completed steady-state cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Boot, take the initial branch, then run steady cycles. Runs forever unless
    /// `max_cycles` is set.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<()> {
        let local = self.boot()?;
        let mut host = self.initial_branch(local);
        while max_cycles.map_or(true, |max| self.cycles < max) {
            host = self.steady_cycle(host);
        }
        log::info!("Stopping after {} cycle(s)", self.cycles);
        drop(host);
        self.stop_scheduler();
        Ok(())
    }

    fn enter(&mut self, phase: LoopPhase) {
        log::info!("Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
        if let Some(pattern) = phase.pattern() {
            self.indicator.show(pattern);
        }
    }

    /// Power-saving, unconditional repair, first snapshot, snapshot thread.
    pub fn boot(&mut self) -> Result<LocalAccess> {
        self.enter(LoopPhase::Booting);
        log::info!("Starting");
        host::display_off(self.hal.as_ref());

        let local = self.gadget.claim_at_boot();
        self.repair_all(&local);

        self.snapshots.snapshot_now();
        if self.snapshots.is_enabled() && self.scheduler.is_none() {
            let interval = Duration::from_secs(self.cfg.snapshots.interval_secs);
            self.scheduler = Some(spawn_scheduler(Arc::clone(&self.snapshots), interval)?);
        }
        Ok(local)
    }

    /// Archive right away if the archive is already reachable, otherwise hand the images
    /// straight to the host.
    pub fn initial_branch(&mut self, local: LocalAccess) -> HostAttached {
        if self.monitor.is_reachable() {
            log::info!("Archive reachable at boot");
            self.enter(LoopPhase::Maintaining);
            host::sync_clock(self.hal.as_ref(), &self.cfg.clock);
            self.maintain(&local);
            self.enter(LoopPhase::Reattaching);
            let host = self.gadget.attach_to_host(local);
            self.await_departure(host)
        } else {
            log::info!("Archive not reachable at boot");
            self.enter(LoopPhase::AwaitingArchive);
            self.gadget.attach_to_host(local)
        }
    }

    /// One trip through the steady state, ending with the images back on the host and
    /// the archive gone.
    pub fn steady_cycle(&mut self, host: HostAttached) -> HostAttached {
        self.enter(LoopPhase::AwaitingArchive);
        self.monitor.wait_until_reachable();

        self.enter(LoopPhase::Maintaining);
        host::sync_clock(self.hal.as_ref(), &self.cfg.clock);
        let settle = self.cfg.settle_delay();
        if !settle.is_zero() {
            log::info!("Waiting {}s for the connection to settle", settle.as_secs());
            std::thread::sleep(settle);
        }
        self.snapshots.snapshot_now();

        let local = self.gadget.detach_from_host(host);
        self.repair_all(&local);
        self.maintain(&local);

        self.enter(LoopPhase::Reattaching);
        let host = self.gadget.attach_to_host(local);
        let host = self.await_departure(host);
        let host = self.gadget.verify_gadget_present(host);

        self.cycles += 1;
        host
    }

    fn await_departure(&mut self, host: HostAttached) -> HostAttached {
        self.enter(LoopPhase::AwaitingDeparture);
        self.monitor.wait_until_unreachable();
        host
    }

    fn repair_all(&self, local: &LocalAccess) {
        for volume in self.volumes.iter() {
            self.mounts.repair_image(local, &volume.image);
        }
    }

    fn maintain(&self, local: &LocalAccess) {
        let report = self.archiver.run_archive_cycle(local);
        log::info!("Archive cycle finished: {:?}", report);
        if let Err(err) = logging::truncate_if_oversized(&self.cfg.log.path, self.cfg.log.max_lines) {
            log::warn!("Could not truncate {}: {}", self.cfg.log.path.display(), err);
        }
    }

    fn stop_scheduler(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.join();
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop_scheduler();
    }
}
