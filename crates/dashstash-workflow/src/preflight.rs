//! Startup checks.
//!
//! Nothing here stops the loop: an appliance with a missing tool still serves the host,
//! so problems are reported and logged rather than returned as errors.

use anyhow::{anyhow, Context, Result};
use dashstash_core::config::{Config, TransportKind};
use libc::statvfs;
use log::{info, warn};
use std::env;
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Warn when the filesystem holding the backing images has less free space than this.
const MIN_BACKING_FREE_MB: u64 = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub missing_binaries: Vec<String>,
    /// Free bytes next to the camera image, if it could be measured.
    pub backing_free_bytes: Option<u64>,
}

impl PreflightReport {
    pub fn is_clean(&self) -> bool {
        self.missing_binaries.is_empty()
            && self
                .backing_free_bytes
                .map_or(true, |free| free >= MIN_BACKING_FREE_MB * 1024 * 1024)
    }
}

/// External tools the loop shells out to with this configuration.
pub fn required_binaries(cfg: &Config) -> Vec<String> {
    let mut bins = vec!["mount", "losetup", "fsck", "fstrim", "filefrag", "modprobe"];
    match cfg.archive.kind {
        TransportKind::SyncToServer => bins.push("rsync"),
        TransportKind::SyncToCloud => bins.push("rclone"),
        TransportKind::Disabled => {}
    }
    if cfg.archive.kind != TransportKind::Disabled && cfg.archive.port.is_none() {
        bins.push("ping");
    }
    let mut bins: Vec<String> = bins.into_iter().map(str::to_string).collect();
    if let Some(program) = cfg
        .clock
        .sync_command
        .as_deref()
        .and_then(|c| c.split_whitespace().next())
    {
        bins.push(program.to_string());
    }
    bins
}

pub fn run(cfg: &Config) -> PreflightReport {
    info!("Preflight checks");

    let missing_binaries = missing_binaries(&required_binaries(cfg));
    for bin in &missing_binaries {
        warn!("Required binary '{}' not found in PATH", bin);
    }

    let backing_dir = cfg
        .volumes
        .camera_image
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    let backing_free_bytes = match available_bytes(&backing_dir) {
        Ok(bytes) => {
            let free_mb = bytes / (1024 * 1024);
            if free_mb < MIN_BACKING_FREE_MB {
                warn!(
                    "Only {} MiB free at {}; snapshots may fail",
                    free_mb,
                    backing_dir.display()
                );
            }
            Some(bytes)
        }
        Err(err) => {
            warn!("{:#}", err);
            None
        }
    };

    let report = PreflightReport {
        missing_binaries,
        backing_free_bytes,
    };
    if report.is_clean() {
        info!("Preflight complete");
    }
    report
}

fn missing_binaries(bins: &[String]) -> Vec<String> {
    let path = env::var_os("PATH").unwrap_or_default();
    let entries = env::split_paths(&path).collect::<Vec<_>>();
    bins.iter()
        .filter(|bin| {
            find_in_paths(bin, &entries)
                .map(|found| ensure_executable(&found).is_err())
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

fn ensure_executable(path: &Path) -> Result<()> {
    let md = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if !md.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }
    use std::os::unix::fs::PermissionsExt;
    if md.permissions().mode() & 0o111 == 0 {
        anyhow::bail!("{} is not executable", path.display());
    }
    Ok(())
}

fn find_in_paths(binary: &str, paths: &[PathBuf]) -> Option<PathBuf> {
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return path.exists().then_some(path);
    }
    paths
        .iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.exists())
}

#[allow(clippy::unnecessary_cast)]
fn available_bytes(path: &Path) -> Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| anyhow!("invalid path for disk space check"))?;
    let mut stat: statvfs = unsafe { std::mem::zeroed() };
    let result = unsafe { statvfs(c_path.as_ptr(), &mut stat) };
    if result != 0 {
        anyhow::bail!("failed to stat filesystem {}", path.display());
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}
