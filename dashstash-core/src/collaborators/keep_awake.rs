use super::KeepAwake;
use anyhow::{Context, Result};
use dashstash_hal::{ProcessOps, SystemHal};
use std::sync::Arc;
use std::time::Duration;

const KEEP_AWAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives the keep-awake mode through configured commands.
pub struct CommandKeepAwake {
    hal: Arc<dyn SystemHal>,
    status_command: String,
    enable_command: String,
    disable_command: String,
}

impl CommandKeepAwake {
    pub fn new(
        hal: Arc<dyn SystemHal>,
        status_command: impl Into<String>,
        enable_command: impl Into<String>,
        disable_command: impl Into<String>,
    ) -> Self {
        Self {
            hal,
            status_command: status_command.into(),
            enable_command: enable_command.into(),
            disable_command: disable_command.into(),
        }
    }
}

impl KeepAwake for CommandKeepAwake {
    fn is_enabled(&self) -> Result<bool> {
        let mut parts = self.status_command.split_whitespace();
        let program = parts.next().context("empty keep-awake status command")?;
        let args: Vec<&str> = parts.collect();
        let output = self
            .hal
            .command_output(program, &args, KEEP_AWAKE_TIMEOUT)
            .context("keep-awake status")?;
        Ok(output.status.success())
    }

    fn enable(&self) -> Result<()> {
        self.hal
            .command_line_status(&self.enable_command, KEEP_AWAKE_TIMEOUT)
            .context("enabling keep-awake")
    }

    fn disable(&self) -> Result<()> {
        self.hal
            .command_line_status(&self.disable_command, KEEP_AWAKE_TIMEOUT)
            .context("disabling keep-awake")
    }
}

/// Used when no keep-awake commands are configured: always reports enabled so nothing
/// is toggled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeepAwake;

impl KeepAwake for NoKeepAwake {
    fn is_enabled(&self) -> Result<bool> {
        Ok(true)
    }

    fn enable(&self) -> Result<()> {
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps the vehicle awake for the guard's lifetime.
///
/// Only turns the mode off on drop if this guard turned it on: if it was already on, or
/// enabling failed, the mode is left alone.
pub struct KeepAwakeGuard<'a> {
    keep_awake: &'a dyn KeepAwake,
    restore: bool,
}

impl<'a> KeepAwakeGuard<'a> {
    pub fn engage(keep_awake: &'a dyn KeepAwake) -> Self {
        let restore = match keep_awake.is_enabled() {
            Ok(true) => {
                log::info!("Keep-awake already enabled");
                false
            }
            Ok(false) => match keep_awake.enable() {
                Ok(()) => {
                    log::info!("Enabled keep-awake for archiving");
                    true
                }
                Err(err) => {
                    log::warn!("Could not enable keep-awake: {:#}", err);
                    false
                }
            },
            Err(err) => {
                log::warn!("Could not read keep-awake state: {:#}", err);
                false
            }
        };
        Self {
            keep_awake,
            restore,
        }
    }
}

impl Drop for KeepAwakeGuard<'_> {
    fn drop(&mut self) {
        if !self.restore {
            return;
        }
        match self.keep_awake.disable() {
            Ok(()) => log::info!("Restored keep-awake to off"),
            Err(err) => log::warn!("Could not restore keep-awake: {:#}", err),
        }
    }
}
