//! Status indicator: named blink patterns on the board's activity LED.

use crate::config::LedConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const LED_CLASS_ROOT: &str = "/sys/class/leds";

/// LED names tried in order when none is configured (older and newer board revisions).
const LED_CANDIDATES: &[&str] = &["led0", "ACT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    /// Waiting for the archive.
    Slow,
    /// Maintenance running.
    Fast,
    /// Maintenance done, handing storage back to the host.
    Double,
}

pub trait StatusIndicator: Send + Sync {
    /// Best-effort; never fails the caller.
    fn show(&self, pattern: BlinkPattern);
}

/// Used when no LED is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn show(&self, pattern: BlinkPattern) {
        log::debug!("status: {:?}", pattern);
    }
}

/// Drives an LED class device through its sysfs trigger attributes.
#[derive(Debug, Clone)]
pub struct SysfsLed {
    dir: PathBuf,
    active_low: bool,
}

impl SysfsLed {
    pub fn new(dir: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            dir: dir.into(),
            active_low,
        }
    }

    fn write_attr(&self, name: &str, value: &str) -> io::Result<()> {
        fs::write(self.dir.join(name), value)
    }

    /// Timer trigger with the given on/off times; swapped on inverted-polarity LEDs.
    fn timer(&self, on_ms: u32, off_ms: u32) -> io::Result<()> {
        let (on_ms, off_ms) = if self.active_low {
            (off_ms, on_ms)
        } else {
            (on_ms, off_ms)
        };
        self.write_attr("trigger", "timer")?;
        self.write_attr("delay_off", &off_ms.to_string())?;
        self.write_attr("delay_on", &on_ms.to_string())
    }

    fn heartbeat(&self) -> io::Result<()> {
        self.write_attr("trigger", "heartbeat")?;
        // Only present once the heartbeat trigger is active, and only on some kernels.
        if self.dir.join("invert").exists() {
            self.write_attr("invert", if self.active_low { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl StatusIndicator for SysfsLed {
    fn show(&self, pattern: BlinkPattern) {
        let result = match pattern {
            BlinkPattern::Slow => self.timer(100, 900),
            BlinkPattern::Fast => self.timer(50, 150),
            BlinkPattern::Double => self.heartbeat(),
        };
        if let Err(err) = result {
            log::debug!("Could not set LED {} to {:?}: {}", self.dir.display(), pattern, err);
        }
    }
}

/// First LED from [`LED_CANDIDATES`] present under `class_root`.
pub fn detect_led_in(class_root: &Path) -> Option<PathBuf> {
    LED_CANDIDATES
        .iter()
        .map(|name| class_root.join(name))
        .find(|dir| dir.join("trigger").exists())
}

pub fn indicator_from_config(cfg: &LedConfig) -> Box<dyn StatusIndicator> {
    let dir = cfg
        .sysfs_dir
        .clone()
        .or_else(|| detect_led_in(Path::new(LED_CLASS_ROOT)));
    match dir {
        Some(dir) => {
            log::info!("Status LED: {}", dir.display());
            Box::new(SysfsLed::new(dir, cfg.active_low))
        }
        None => {
            log::info!("No status LED found");
            Box::new(NullIndicator)
        }
    }
}
