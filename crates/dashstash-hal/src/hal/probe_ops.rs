//! Kernel state probes (sysfs/procfs) the supervisor re-derives instead of tracking.

use crate::HalResult;
use std::path::PathBuf;

/// A logical unit exposed by the USB mass-storage gadget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GadgetLun {
    /// sysfs path of the LUN directory (e.g. `.../fe980000.usb/gadget/lun0`).
    pub path: PathBuf,
    /// Image file currently backing the LUN; `None` when the LUN is empty.
    pub backing_file: Option<PathBuf>,
}

pub trait ProbeOps {
    /// Logical units currently exposed by the mass-storage gadget.
    fn gadget_luns(&self) -> HalResult<Vec<GadgetLun>>;

    /// Cumulative bytes written by the gadget's `file-storage` kernel thread, if it runs.
    fn gadget_write_bytes(&self) -> HalResult<Option<u64>>;
}
