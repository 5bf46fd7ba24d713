//! USB mass-storage gadget lifecycle.
//!
//! The gadget module is the only way the host sees the backing images, so loading and
//! unloading it is what transfers ownership. The bound state is never cached: it is
//! re-derived from sysfs after every attach.

use crate::config::GadgetConfig;
use crate::mounts::MountManager;
use crate::ownership::{HostAttached, LocalAccess};
use crate::volumes::Volumes;
use dashstash_hal::{ModuleOps, ProbeOps, SystemHal};
use std::sync::Arc;

pub struct GadgetManager {
    hal: Arc<dyn SystemHal>,
    cfg: GadgetConfig,
    volumes: Volumes,
    mounts: Arc<MountManager>,
}

impl GadgetManager {
    pub fn new(
        hal: Arc<dyn SystemHal>,
        cfg: GadgetConfig,
        volumes: Volumes,
        mounts: Arc<MountManager>,
    ) -> Self {
        Self {
            hal,
            cfg,
            volumes,
            mounts,
        }
    }

    /// Take local ownership at process start, unloading a gadget left over from a previous
    /// run.
    pub fn claim_at_boot(&self) -> LocalAccess {
        self.unload();
        LocalAccess::new()
    }

    /// Expose the images to the host. Every volume is unmounted first.
    pub fn attach_to_host(&self, local: LocalAccess) -> HostAttached {
        for volume in self.volumes.iter() {
            self.mounts.unmount(&volume.mount_point);
        }
        drop(local);

        let params = self.module_params();
        log::info!("Attaching images to host: {} {}", self.cfg.module, params.join(" "));
        if let Err(err) = self.hal.load_module(&self.cfg.module, &params) {
            // The verify step after the next wait notices and heals this.
            log::error!("Failed to load {}: {}", self.cfg.module, err);
        }
        HostAttached::new()
    }

    /// Take the images back from the host.
    pub fn detach_from_host(&self, host: HostAttached) -> LocalAccess {
        drop(host);
        log::info!("Detaching images from host");
        self.unload();
        LocalAccess::new()
    }

    /// Whether the gadget exposes the camera image as its first logical unit.
    pub fn gadget_present(&self) -> bool {
        let camera = &self.volumes.camera.image;
        match self.hal.gadget_luns() {
            Ok(luns) => luns.iter().any(|lun| {
                lun.path.file_name().is_some_and(|name| name == "lun0")
                    && lun.backing_file.as_deref() == Some(camera.as_path())
            }),
            Err(err) => {
                log::warn!("Could not probe gadget LUNs: {}", err);
                false
            }
        }
    }

    /// Check that the last attach actually produced a gadget. If not, run exactly one
    /// detach -> repair -> re-attach cycle.
    pub fn verify_gadget_present(&self, host: HostAttached) -> HostAttached {
        if self.gadget_present() {
            log::debug!("Gadget present");
            return host;
        }
        log::warn!("Gadget not present after attach; detaching, repairing, and re-attaching");
        let local = self.detach_from_host(host);
        for volume in self.volumes.iter() {
            self.mounts.repair_image(&local, &volume.image);
        }
        let host = self.attach_to_host(local);
        if !self.gadget_present() {
            log::error!("Gadget still not present after re-attach");
        }
        host
    }

    fn unload(&self) {
        match self.hal.module_loaded(&self.cfg.module) {
            Ok(false) => {
                log::debug!("{} not loaded", self.cfg.module);
                return;
            }
            Ok(true) => {}
            Err(err) => log::debug!("Could not check whether {} is loaded: {}", self.cfg.module, err),
        }
        if let Err(err) = self.hal.unload_module(&self.cfg.module) {
            log::warn!("Failed to unload {}: {}", self.cfg.module, err);
        }
    }

    fn module_params(&self) -> Vec<String> {
        let count = self.volumes.iter().count();
        let files = self
            .volumes
            .iter()
            .map(|v| v.image.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![format!("file={files}")];
        // Per-LUN parameters take one value per image.
        params.extend(self.cfg.params.iter().map(|p| match p.split_once('=') {
            Some((key, value)) if is_per_lun(key) => {
                format!("{key}={}", vec![value; count].join(","))
            }
            _ => p.clone(),
        }));
        params
    }
}

fn is_per_lun(key: &str) -> bool {
    matches!(key, "removable" | "ro" | "cdrom" | "nofua")
}
