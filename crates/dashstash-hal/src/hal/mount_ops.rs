//! Mount operations trait.

use crate::HalResult;
use std::path::Path;

/// Trait for mounting and unmounting the pre-configured volume mount points.
pub trait MountOps {
    /// Mount a mount point described in the system fstab (`mount <target>`).
    ///
    /// The fstab entry carries the backing image, offset, and filesystem options, so the
    /// caller only names the mount point.
    fn mount_fstab(&self, target: &Path) -> HalResult<()>;

    /// Unmount a filesystem.
    ///
    /// # Arguments
    /// * `target` - Mount point path to unmount
    /// * `lazy` - Detach now and clean up once the filesystem is no longer busy
    fn unmount(&self, target: &Path, lazy: bool) -> HalResult<()>;

    /// Check if a path is currently mounted.
    fn is_mounted(&self, path: &Path) -> HalResult<bool>;

    /// Source device of the filesystem mounted at `target` (e.g. `/dev/loop0p1`).
    fn mount_source(&self, target: &Path) -> HalResult<Option<String>>;
}
