//! Discovery of mass-storage gadget logical units in sysfs.
//!
//! On a Raspberry Pi the UDC sits under `/sys/devices/platform/soc/<addr>.usb`; once
//! `g_mass_storage` binds, each LUN appears as `<udc>/gadget/lun<N>/file`.

use crate::{GadgetLun, HalResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Default platform directory scanned for USB device controllers.
pub const DEFAULT_PLATFORM_ROOT: &str = "/sys/devices/platform/soc";

pub fn scan_gadget_luns_in(platform_root: &Path) -> HalResult<Vec<GadgetLun>> {
    let mut luns = Vec::new();
    let entries = match fs::read_dir(platform_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(luns),
        Err(err) => return Err(err.into()),
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".usb") {
            continue;
        }
        let gadget_dir = entry.path().join("gadget");
        let Ok(gadget_entries) = fs::read_dir(&gadget_dir) else {
            continue;
        };
        for lun in gadget_entries.flatten() {
            let lun_name = lun.file_name().to_string_lossy().to_string();
            if !lun_name.starts_with("lun") {
                continue;
            }
            let file = lun.path().join("file");
            if !file.exists() {
                continue;
            }
            let backing = fs::read_to_string(&file).unwrap_or_default();
            let backing = backing.trim();
            luns.push(GadgetLun {
                path: lun.path(),
                backing_file: (!backing.is_empty()).then(|| PathBuf::from(backing)),
            });
        }
    }

    luns.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(luns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_lun(root: &Path, udc: &str, lun: &str, backing: &str) {
        let dir = root.join(udc).join("gadget").join(lun);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("file"), backing).unwrap();
    }

    #[test]
    fn finds_luns_under_usb_controllers() {
        let root = tempdir().unwrap();
        make_lun(root.path(), "fe980000.usb", "lun0", "/backingfiles/cam_disk.bin\n");
        make_lun(root.path(), "fe980000.usb", "lun1", "");
        make_lun(root.path(), "fe00b840.mailbox", "lun0", "/bogus");

        let luns = scan_gadget_luns_in(root.path()).unwrap();
        assert_eq!(luns.len(), 2);
        assert_eq!(
            luns[0].backing_file,
            Some(PathBuf::from("/backingfiles/cam_disk.bin"))
        );
        assert_eq!(luns[1].backing_file, None);
    }

    #[test]
    fn missing_platform_root_means_no_luns() {
        let luns = scan_gadget_luns_in(Path::new("/nonexistent/platform")).unwrap();
        assert!(luns.is_empty());
    }
}
