//! Process execution helpers.
//!
//! External commands (clock sync, display power, keep-awake hooks, snapshot scripts) are
//! "world-touching" and go through the HAL so the control loop can be tested without
//! spawning real processes.

use crate::{HalError, HalResult};
use std::process::Output;
use std::time::Duration;

/// Process execution trait (external command runner).
pub trait ProcessOps {
    /// Run `program` and capture its output. A non-zero exit is *not* an error here.
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output>;

    /// Run `program` and fail unless it exits successfully.
    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let output = self.command_output(program, args, timeout)?;
        if !output.status.success() {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run a whitespace-separated command line (`"sntp -S time.google.com"`).
    fn command_line_status(&self, command_line: &str, timeout: Duration) -> HalResult<()> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| HalError::Other("empty command line".to_string()))?;
        let args: Vec<&str> = parts.collect();
        self.command_status(program, &args, timeout)
    }
}
