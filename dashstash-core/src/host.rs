//! Best-effort host housekeeping run by the control loop.

use crate::config::ClockConfig;
use dashstash_hal::{ProcessOps, SystemHal};
use std::time::Duration;

/// Turn off HDMI output to save power. Boards without `tvservice` just log.
pub fn display_off(hal: &dyn SystemHal) {
    match hal.command_status("tvservice", &["-o"], Duration::from_secs(5)) {
        Ok(()) => log::info!("Display output off"),
        Err(err) => log::debug!("Could not turn display off: {}", err),
    }
}

/// Sync the clock once the network is up. Skipped when no command is configured.
pub fn sync_clock(hal: &dyn SystemHal, cfg: &ClockConfig) {
    let Some(command) = &cfg.sync_command else {
        return;
    };
    match hal.command_line_status(command, Duration::from_secs(cfg.timeout_secs)) {
        Ok(()) => log::info!("Clock synced"),
        Err(err) => log::warn!("Clock sync failed: {}", err),
    }
}
