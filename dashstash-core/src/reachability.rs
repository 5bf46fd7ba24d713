//! Archive reachability monitor.
//!
//! Reachability gates both the start of maintenance (wait until reachable) and its end
//! (wait until unreachable), so the images are kept away from the host only while the
//! network is actually usable.

use crate::config::{ArchiveEndpoint, MarkerConfig, TransportKind};
use crate::retry::RetryBudget;
use crate::waiter::Waiter;
use dashstash_hal::{NetOps, SystemHal};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single reachability check; never retries.
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Probes the configured archive endpoint through the HAL.
pub struct EndpointProbe {
    hal: Arc<dyn SystemHal>,
    endpoint: ArchiveEndpoint,
}

impl EndpointProbe {
    pub fn new(hal: Arc<dyn SystemHal>, endpoint: ArchiveEndpoint) -> Self {
        Self { hal, endpoint }
    }
}

impl ReachabilityProbe for EndpointProbe {
    fn is_reachable(&self) -> bool {
        let endpoint = &self.endpoint;
        match (endpoint.kind, endpoint.port) {
            (TransportKind::Disabled, _) => false,
            (_, Some(port)) => {
                self.hal
                    .tcp_reachable(&endpoint.address, port, endpoint.probe_timeout)
            }
            (_, None) => self.hal.ping(&endpoint.address, endpoint.probe_timeout),
        }
    }
}

/// Test-only files that force-complete a wait once.
#[derive(Debug, Clone)]
pub struct SimulationMarkers {
    pub reachable: PathBuf,
    pub unreachable: PathBuf,
}

impl From<&MarkerConfig> for SimulationMarkers {
    fn from(cfg: &MarkerConfig) -> Self {
        Self {
            reachable: cfg.reachable.clone(),
            unreachable: cfg.unreachable.clone(),
        }
    }
}

/// Remove `marker` if present. Returns whether it was there.
fn take_marker(marker: &Path) -> bool {
    match fs::remove_file(marker) {
        Ok(()) => {
            log::info!("Simulation marker {} consumed", marker.display());
            true
        }
        Err(_) => false,
    }
}

pub struct ReachabilityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    waiter: Box<dyn Waiter>,
    markers: SimulationMarkers,
    unreachable_budget: RetryBudget,
}

impl ReachabilityMonitor {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        waiter: Box<dyn Waiter>,
        markers: SimulationMarkers,
        unreachable_budget: RetryBudget,
    ) -> Self {
        Self {
            probe,
            waiter,
            markers,
            unreachable_budget,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.probe.is_reachable()
    }

    /// Block until the archive answers. Never times out.
    pub fn wait_until_reachable(&self) {
        log::info!("Waiting for archive to be reachable...");
        loop {
            if take_marker(&self.markers.reachable) {
                log::info!("Simulating archive is reachable");
                return;
            }
            if self.probe.is_reachable() {
                log::info!("Archive is reachable");
                return;
            }
            self.waiter.pause();
        }
    }

    /// Block until the archive stops answering for a whole retry budget.
    pub fn wait_until_unreachable(&self) {
        log::info!("Waiting for archive to be unreachable...");
        loop {
            if take_marker(&self.markers.unreachable) {
                log::info!("Simulating archive being unreachable");
                return;
            }
            if !self.unreachable_budget.run(|_| self.probe.is_reachable()) {
                log::info!("Archive is unreachable");
                return;
            }
            if take_marker(&self.markers.unreachable) {
                log::info!("Simulating archive being unreachable");
                return;
            }
            self.waiter.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::PollWaiter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    /// Answers `initially` for the first `flip_after` probes, then the opposite.
    struct ScriptedProbe {
        calls: AtomicU32,
        flip_after: u32,
        initially: bool,
    }

    impl ScriptedProbe {
        fn new(initially: bool, flip_after: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                flip_after,
                initially,
            }
        }
    }

    impl ReachabilityProbe for ScriptedProbe {
        fn is_reachable(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.flip_after {
                self.initially
            } else {
                !self.initially
            }
        }
    }

    fn monitor(probe: Arc<dyn ReachabilityProbe>, dir: &Path, poll: Duration) -> ReachabilityMonitor {
        ReachabilityMonitor::new(
            probe,
            Box::new(PollWaiter::new(poll)),
            SimulationMarkers {
                reachable: dir.join("archive_is_reachable"),
                unreachable: dir.join("archive_is_unreachable"),
            },
            RetryBudget::new(10, Duration::ZERO),
        )
    }

    #[test]
    fn waits_for_reachable() {
        let dir = tempdir().unwrap();
        let probe = Arc::new(ScriptedProbe::new(false, 5));
        monitor(probe.clone(), dir.path(), Duration::ZERO).wait_until_reachable();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unreachable_needs_a_full_budget_of_failures() {
        let dir = tempdir().unwrap();
        let probe = Arc::new(ScriptedProbe::new(true, 3));
        monitor(probe.clone(), dir.path(), Duration::ZERO).wait_until_unreachable();
        // 3 successful rounds, then one round of 10 failed attempts.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 13);
    }

    #[test]
    fn reachable_marker_completes_wait_once() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("archive_is_reachable");
        fs::write(&marker, b"").unwrap();
        let probe = Arc::new(ScriptedProbe::new(false, u32::MAX));
        monitor(probe.clone(), dir.path(), Duration::ZERO).wait_until_reachable();
        assert!(!marker.exists());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unreachable_marker_created_mid_wait_completes_within_a_poll() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("archive_is_unreachable");
        let probe = Arc::new(ScriptedProbe::new(true, u32::MAX));
        let monitor = monitor(probe, dir.path(), Duration::from_millis(100));

        let creator = {
            let marker = marker.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(250));
                fs::write(&marker, b"").unwrap();
                Instant::now()
            })
        };
        monitor.wait_until_unreachable();
        let returned = Instant::now();
        let created = creator.join().unwrap();

        assert!(!marker.exists());
        assert!(returned.duration_since(created) <= Duration::from_millis(100 + 150));
    }

    #[test]
    fn disabled_endpoint_is_never_reachable() {
        let hal = dashstash_hal::FakeHal::new();
        hal.set_reachable(true);
        let probe = EndpointProbe::new(
            Arc::new(hal),
            ArchiveEndpoint {
                kind: TransportKind::Disabled,
                address: String::new(),
                port: None,
                probe_timeout: Duration::from_secs(1),
            },
        );
        assert!(!probe.is_reachable());
    }
}
