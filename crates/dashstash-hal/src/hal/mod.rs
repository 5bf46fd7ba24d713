//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod fs_ops;
pub mod guards;
pub mod linux_hal;
pub mod loop_ops;
pub mod module_ops;
pub mod mount_ops;
pub mod net_ops;
pub mod probe_ops;
pub mod process_ops;
pub mod rsync_ops;

pub use fake_hal::{FakeHal, Operation};
pub use fs_ops::{parse_filefrag_extents, FsOps, FsckReport};
pub use guards::LoopGuard;
pub use linux_hal::LinuxHal;
pub use loop_ops::LoopOps;
pub use module_ops::ModuleOps;
pub use mount_ops::MountOps;
pub use net_ops::NetOps;
pub use probe_ops::{GadgetLun, ProbeOps};
pub use process_ops::ProcessOps;
pub use rsync_ops::{RsyncOps, RsyncOptions};

/// Complete HAL combining all system operation traits.
pub trait SystemHal:
    MountOps + LoopOps + FsOps + ModuleOps + NetOps + ProbeOps + ProcessOps + RsyncOps + Send + Sync
{
}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where
    T: MountOps
        + LoopOps
        + FsOps
        + ModuleOps
        + NetOps
        + ProbeOps
        + ProcessOps
        + RsyncOps
        + Send
        + Sync
{
}
