use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;

/// Exit code reported when another instance already holds the singleton lock.
pub const EXIT_ALREADY_RUNNING: i32 = 3;
/// Exit code for configuration problems detected at startup (EX_CONFIG).
pub const EXIT_CONFIG: i32 = 78;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Target is busy (mounted or in use)")]
    Busy,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not mounted: {0}")]
    NotMounted(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("nix errno: {0}")]
    Nix(#[from] nix::errno::Errno),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum StashError {
    #[error("Another instance is already running (lock held on {0})")]
    AlreadyRunning(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StashError {
    /// Process exit code this error should terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            StashError::AlreadyRunning(_) => EXIT_ALREADY_RUNNING,
            StashError::Config(_) => EXIT_CONFIG,
        }
    }
}

impl HalError {
    /// Exit status of the failed external command, if this error carries one.
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            HalError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}
