//! Contracts for the collaborators the supervisor delegates to.
//!
//! The mechanics behind these (how clips are copied, how the vehicle is kept awake, how
//! snapshots are made) live outside this crate; each trait has a command- or HAL-backed
//! implementation and a null implementation for when the feature is not configured.

pub mod keep_awake;
pub mod notify;
pub mod snapshot;
pub mod transport;

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

pub use keep_awake::{CommandKeepAwake, KeepAwakeGuard, NoKeepAwake};
pub use notify::{LogNotifier, WebhookNotifier};
pub use snapshot::{CommandSnapshotter, GadgetIdleProbe};
pub use transport::{DisabledTransport, RcloneTransport, RsyncTransport, SessionHooks};

/// Copies content between the local volumes and the archive.
pub trait ArchiveTransport: Send + Sync {
    /// Establish a session with the archive. `false` skips the whole archive cycle.
    fn connect(&self) -> bool;

    fn disconnect(&self);

    /// Move recorded clips from `clip_dir` (one event per sub-folder) to the archive.
    /// `name` is the folder's name relative to the camera mount.
    fn archive_clips(&self, clip_dir: &Path, name: &str) -> Result<()>;

    /// Whether the remote music library answers within `timeout`.
    fn music_available(&self, timeout: Duration) -> bool;

    /// Mirror the remote music library onto `music_root`.
    fn sync_music(&self, music_root: &Path) -> Result<()>;
}

/// External power-assist mode that keeps the vehicle (and thus this device) powered.
pub trait KeepAwake: Send + Sync {
    fn is_enabled(&self) -> Result<bool>;
    fn enable(&self) -> Result<()>;
    fn disable(&self) -> Result<()>;
}

/// One-shot side channel for human-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// Creates a filesystem snapshot of the camera image.
pub trait Snapshotter: Send + Sync {
    fn snapshot(&self) -> Result<()>;
}

/// Best-effort wait for the host to stop writing to the gadget.
pub trait IdleProbe: Send + Sync {
    /// Returns whether idleness was confirmed before giving up.
    fn wait_for_idle(&self) -> bool;
}
