//! Mount reliability layer: retrying mounts, best-effort unmounts, image repair, and trim.
//!
//! Nothing here aborts the control loop. Mount failures are returned so the caller can
//! skip a volume; unmount, repair, and trim only log.

use crate::ownership::LocalAccess;
use crate::retry::RetryBudget;
use anyhow::{Context, Result};
use dashstash_hal::path::{parent_device, partition_path};
use dashstash_hal::{FsOps, FsckReport, LoopGuard, LoopOps, MountOps, SystemHal};
use std::path::Path;
use std::sync::Arc;

pub struct MountManager {
    hal: Arc<dyn SystemHal>,
    retry: RetryBudget,
}

impl MountManager {
    pub fn new(hal: Arc<dyn SystemHal>, retry: RetryBudget) -> Self {
        Self { hal, retry }
    }

    /// Mount a pre-configured mount point once.
    pub fn mount(&self, _access: &LocalAccess, mount_point: &Path) -> Result<()> {
        self.hal
            .mount_fstab(mount_point)
            .with_context(|| format!("Failed to mount {}", mount_point.display()))
            .inspect_err(|err| log::warn!("{:#}", err))
    }

    /// Mount unless the mount table already lists `mount_point`.
    pub fn ensure_mounted(&self, access: &LocalAccess, mount_point: &Path) -> Result<()> {
        if self.is_mounted(mount_point) {
            log::debug!("{} already mounted", mount_point.display());
            return Ok(());
        }
        self.mount(access, mount_point)
    }

    /// [`Self::ensure_mounted`] under the mount retry budget.
    pub fn ensure_mounted_with_retry(&self, access: &LocalAccess, mount_point: &Path) -> Result<()> {
        log::info!("Ensuring {} is mounted", mount_point.display());
        let mounted = self.retry.run(|attempt| {
            let ok = self.ensure_mounted(access, mount_point).is_ok();
            if !ok {
                log::info!(
                    "Mount attempt {}/{} for {} failed",
                    attempt,
                    self.retry.attempts,
                    mount_point.display()
                );
            }
            ok
        });
        if !mounted {
            anyhow::bail!(
                "Failed to mount {} after {} attempts",
                mount_point.display(),
                self.retry.attempts
            );
        }
        log::info!("Mounted {}", mount_point.display());
        Ok(())
    }

    /// Unmount, falling back to a lazy unmount. Safe to call on an unmounted path.
    pub fn unmount(&self, mount_point: &Path) {
        if !self.is_mounted(mount_point) {
            log::debug!("{} not mounted", mount_point.display());
            return;
        }
        match self.hal.unmount(mount_point, false) {
            Ok(()) => log::info!("Unmounted {}", mount_point.display()),
            Err(err) => {
                log::warn!(
                    "Unmount of {} failed ({}); trying lazy unmount",
                    mount_point.display(),
                    err
                );
                match self.hal.unmount(mount_point, true) {
                    Ok(()) => log::info!("Lazily unmounted {}", mount_point.display()),
                    Err(err) => {
                        log::error!("Lazy unmount of {} failed: {}", mount_point.display(), err)
                    }
                }
            }
        }
    }

    /// Attach `image` as a partition-mapped loop device, fsck its first partition with
    /// auto-repair, and detach the loop device whatever fsck reports.
    pub fn repair_image(&self, _access: &LocalAccess, image: &Path) -> Option<FsckReport> {
        log::info!("Running fsck on {}", image.display());
        let loop_device = match self.hal.losetup_attach(image, true) {
            Ok(dev) => dev,
            Err(err) => {
                log::error!("Failed to attach {} to a loop device: {}", image.display(), err);
                return None;
            }
        };
        let guard = LoopGuard::new(self.hal.as_ref(), loop_device);
        let partition = partition_path(guard.device(), 1);

        let report = match self.hal.fsck_repair(&partition) {
            Ok(report) => report,
            Err(err) => {
                log::error!("fsck of {} could not run: {}", partition, err);
                return None;
            }
        };
        if !report.output.is_empty() {
            log::info!("{}", report.output);
        }
        match (report.is_clean(), report.errors_corrected()) {
            (true, false) => log::info!("{} is clean", image.display()),
            (true, true) => log::warn!("Repaired filesystem errors on {}", image.display()),
            (false, _) => log::error!(
                "fsck left errors on {} (exit code {})",
                image.display(),
                report.exit_code
            ),
        }
        Some(report)
    }

    /// Discard free blocks of a mounted volume, logging the backing image's fragmentation
    /// before and after. No-op if `mount_point` is not mounted.
    pub fn trim_free_space(&self, _access: &LocalAccess, mount_point: &Path) {
        if !self.is_mounted(mount_point) {
            log::info!("{} not mounted; skipping trim", mount_point.display());
            return;
        }

        let image = match self.backing_image(mount_point) {
            Ok(image) => Some(image),
            Err(err) => {
                log::warn!("Could not resolve image behind {}: {:#}", mount_point.display(), err);
                None
            }
        };
        let extents = |label: &str| {
            if let Some(image) = &image {
                match self.hal.extent_count(image) {
                    Ok(count) => log::info!("{} {} has {} extents", label, image.display(), count),
                    Err(err) => log::debug!("filefrag {} failed: {}", image.display(), err),
                }
            }
        };

        log::info!("Trimming free space in {}", mount_point.display());
        extents("Before trim,");
        match self.hal.fstrim(mount_point) {
            Ok(summary) => log::info!("{}", summary),
            Err(err) => log::warn!("Trim of {} failed: {}", mount_point.display(), err),
        }
        extents("After trim,");
    }

    pub fn is_mounted(&self, mount_point: &Path) -> bool {
        self.hal.is_mounted(mount_point).unwrap_or_else(|err| {
            log::warn!("Could not read mount table: {}", err);
            false
        })
    }

    fn backing_image(&self, mount_point: &Path) -> Result<std::path::PathBuf> {
        let source = self
            .hal
            .mount_source(mount_point)?
            .with_context(|| format!("{} has no mount source", mount_point.display()))?;
        let loop_device = parent_device(&source);
        Ok(self.hal.loop_backing_file(&loop_device)?)
    }
}
