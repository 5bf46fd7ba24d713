//! Filesystem maintenance operations (fsck, fstrim, filefrag).

use crate::{HalError, HalResult};
use std::path::Path;

/// Outcome of a filesystem check.
///
/// `fsck` encodes its result as a bit mask in the exit code, so a non-zero code is not an
/// execution failure by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckReport {
    pub exit_code: i32,
    pub output: String,
}

impl FsckReport {
    /// No errors, or errors found and corrected.
    pub fn is_clean(&self) -> bool {
        self.exit_code & !1 == 0
    }

    pub fn errors_corrected(&self) -> bool {
        self.exit_code & 1 != 0
    }
}

pub trait FsOps {
    /// Run a filesystem check with automatic repair on `device`.
    fn fsck_repair(&self, device: &str) -> HalResult<FsckReport>;

    /// Discard unused blocks of the filesystem mounted at `mount_point`.
    fn fstrim(&self, mount_point: &Path) -> HalResult<String>;

    /// Number of extents `file` occupies on the underlying filesystem.
    fn extent_count(&self, file: &Path) -> HalResult<u64>;
}

/// Parse `filefrag` output (`/backingfiles/cam_disk.bin: 1234 extents found`).
pub fn parse_filefrag_extents(output: &str) -> HalResult<u64> {
    let line = output
        .lines()
        .rev()
        .find(|l| l.contains("extent"))
        .ok_or_else(|| HalError::Parse(format!("unexpected filefrag output: {output:?}")))?;
    let (_, counts) = line
        .rsplit_once(": ")
        .ok_or_else(|| HalError::Parse(format!("unexpected filefrag line: {line:?}")))?;
    counts
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| HalError::Parse(format!("no extent count in {line:?}")))
}
