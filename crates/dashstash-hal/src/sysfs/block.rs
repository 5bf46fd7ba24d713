//! Helpers related to block devices in sysfs.

use crate::{HalError, HalResult};
use std::fs;
use std::path::{Path, PathBuf};

pub fn device_basename(path: &Path) -> HalResult<String> {
    let name = path
        .file_name()
        .ok_or_else(|| HalError::Parse(format!("invalid device path {}", path.display())))?
        .to_string_lossy()
        .to_string();
    Ok(name)
}

/// Reads the image file backing a loop device from `<sys_block_root>/<loopN>/loop/backing_file`.
pub fn loop_backing_file_in(sys_block_root: &Path, loop_device: &Path) -> HalResult<PathBuf> {
    let name = device_basename(loop_device)?;
    let raw = fs::read_to_string(sys_block_root.join(&name).join("loop/backing_file"))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HalError::Parse(format!("{name} has no backing file")));
    }
    Ok(PathBuf::from(trimmed))
}
