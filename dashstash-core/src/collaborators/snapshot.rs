use super::{IdleProbe, Snapshotter};
use anyhow::{Context, Result};
use dashstash_hal::{ProbeOps, ProcessOps, SystemHal};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Runs the external snapshot script.
pub struct CommandSnapshotter {
    hal: Arc<dyn SystemHal>,
    command: String,
}

impl CommandSnapshotter {
    pub fn new(hal: Arc<dyn SystemHal>, command: impl Into<String>) -> Self {
        Self {
            hal,
            command: command.into(),
        }
    }
}

impl Snapshotter for CommandSnapshotter {
    fn snapshot(&self) -> Result<()> {
        self.hal
            .command_line_status(&self.command, SNAPSHOT_TIMEOUT)
            .with_context(|| format!("snapshot command `{}`", self.command))
    }
}

/// Considers the host idle once the gadget's `file-storage` thread has written nothing
/// for `quiet_samples` consecutive samples.
pub struct GadgetIdleProbe {
    hal: Arc<dyn SystemHal>,
    sample_interval: Duration,
    quiet_samples: u32,
    max_wait: Duration,
}

impl GadgetIdleProbe {
    pub fn new(hal: Arc<dyn SystemHal>, max_wait: Duration) -> Self {
        Self {
            hal,
            sample_interval: Duration::from_secs(1),
            quiet_samples: 5,
            max_wait,
        }
    }

    pub fn with_sampling(mut self, interval: Duration, quiet_samples: u32) -> Self {
        self.sample_interval = interval;
        self.quiet_samples = quiet_samples;
        self
    }
}

impl IdleProbe for GadgetIdleProbe {
    fn wait_for_idle(&self) -> bool {
        let start = Instant::now();
        let mut last: Option<u64> = None;
        let mut quiet = 0;
        loop {
            let current = match self.hal.gadget_write_bytes() {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    log::debug!("No file-storage thread; host is idle");
                    return true;
                }
                Err(err) => {
                    log::warn!("Could not sample gadget writes: {}", err);
                    return false;
                }
            };
            if last == Some(current) {
                quiet += 1;
                if quiet >= self.quiet_samples {
                    return true;
                }
            } else {
                quiet = 0;
            }
            last = Some(current);

            if start.elapsed() >= self.max_wait {
                log::warn!("Host still writing after {}s", self.max_wait.as_secs());
                return false;
            }
            std::thread::sleep(self.sample_interval);
        }
    }
}
