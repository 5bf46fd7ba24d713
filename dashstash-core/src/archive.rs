//! Archival orchestrator: the per-volume maintenance cycle.
//!
//! Each volume runs mount, transfer, trim, unmount on its own. A failure in one volume is
//! logged and recorded in the [`CycleReport`] and never stops the other from running.

use crate::collaborators::{ArchiveTransport, KeepAwake, KeepAwakeGuard, Notifier};
use crate::mounts::MountManager;
use crate::ownership::LocalAccess;
use crate::volumes::{BackingVolume, Volumes};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// What happened to one volume during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeOutcome {
    /// The volume could not be mounted within the retry budget.
    MountFailed,
    /// Mounted, but nothing was waiting to be archived.
    NothingPending,
    /// The remote side was not available, so the volume was left alone.
    Unavailable,
    Transferred,
    TransferFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub connected: bool,
    pub camera: Option<VolumeOutcome>,
    /// `None` when there is no music volume.
    pub music: Option<VolumeOutcome>,
}

/// Recorded events waiting under the clip folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingClips {
    pub event_folders: usize,
    pub files: usize,
}

impl PendingClips {
    pub fn is_empty(&self) -> bool {
        self.event_folders == 0 && self.files == 0
    }
}

/// Count event folders (direct sub-folders) and files (recursively) under each clip folder
/// of `camera_root`. Missing clip folders count as empty.
pub fn count_pending(camera_root: &Path, clip_dirs: &[String]) -> PendingClips {
    let mut pending = PendingClips::default();
    for dir in clip_dirs {
        let root = camera_root.join(dir);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root).min_depth(1).into_iter().flatten() {
            let file_type = entry.file_type();
            if file_type.is_dir() && entry.depth() == 1 {
                pending.event_folders += 1;
            } else if file_type.is_file() {
                pending.files += 1;
            }
        }
    }
    pending
}

/// Remove directories left empty under `root` after their files were moved away.
/// `root` itself is kept.
fn prune_empty_dirs(root: &Path) {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .flatten()
    {
        if entry.file_type().is_dir() {
            // Fails harmlessly on non-empty directories.
            let _ = fs::remove_dir(entry.path());
        }
    }
}

pub struct Archiver {
    mounts: Arc<MountManager>,
    volumes: Volumes,
    clip_dirs: Vec<String>,
    transport: Arc<dyn ArchiveTransport>,
    keep_awake: Arc<dyn KeepAwake>,
    notifier: Arc<dyn Notifier>,
    notify_title: String,
    music_check_timeout: Duration,
}

impl Archiver {
    pub fn new(
        mounts: Arc<MountManager>,
        volumes: Volumes,
        clip_dirs: Vec<String>,
        transport: Arc<dyn ArchiveTransport>,
        keep_awake: Arc<dyn KeepAwake>,
        notifier: Arc<dyn Notifier>,
        notify_title: impl Into<String>,
        music_check_timeout: Duration,
    ) -> Self {
        Self {
            mounts,
            volumes,
            clip_dirs,
            transport,
            keep_awake,
            notifier,
            notify_title: notify_title.into(),
            music_check_timeout,
        }
    }

    /// Connect, archive camera then music, disconnect. A refused connection skips the cycle.
    pub fn run_archive_cycle(&self, access: &LocalAccess) -> CycleReport {
        if !self.transport.connect() {
            log::warn!("Could not connect to the archive; skipping this cycle");
            return CycleReport::default();
        }
        log::info!("Connected to the archive");

        let camera = self.archive_camera_clips(access);
        let music = self.archive_music(access);

        self.transport.disconnect();
        log::info!("Disconnected from the archive");

        CycleReport {
            connected: true,
            camera: Some(camera),
            music,
        }
    }

    pub fn archive_camera_clips(&self, access: &LocalAccess) -> VolumeOutcome {
        let volume = &self.volumes.camera;
        if let Err(err) = self.mounts.ensure_mounted_with_retry(access, &volume.mount_point) {
            log::error!("Skipping clip archiving: {:#}", err);
            self.mounts.unmount(&volume.mount_point);
            return VolumeOutcome::MountFailed;
        }

        let outcome = self.transfer_clips(volume);

        self.mounts.trim_free_space(access, &volume.mount_point);
        self.mounts.unmount(&volume.mount_point);
        outcome
    }

    fn transfer_clips(&self, volume: &BackingVolume) -> VolumeOutcome {
        let pending = count_pending(&volume.mount_point, &self.clip_dirs);
        if pending.is_empty() {
            log::info!("No clips to archive");
            return VolumeOutcome::NothingPending;
        }

        let message = format!(
            "Archiving {} event folder(s) with {} file(s)",
            pending.event_folders, pending.files
        );
        log::info!("{}", message);
        if let Err(err) = self.notifier.notify(&self.notify_title, &message) {
            log::warn!("Notification failed: {:#}", err);
        }

        let _awake = KeepAwakeGuard::engage(self.keep_awake.as_ref());
        let mut failed = false;
        for dir in &self.clip_dirs {
            let clip_dir = volume.mount_point.join(dir);
            if !clip_dir.is_dir() {
                continue;
            }
            match self.transport.archive_clips(&clip_dir, dir) {
                Ok(()) => prune_empty_dirs(&clip_dir),
                Err(err) => {
                    log::error!("Archiving {} failed: {:#}", dir, err);
                    failed = true;
                }
            }
        }

        if failed {
            VolumeOutcome::TransferFailed
        } else {
            log::info!("Finished archiving clips");
            VolumeOutcome::Transferred
        }
    }

    /// `None` when there is no music volume.
    pub fn archive_music(&self, access: &LocalAccess) -> Option<VolumeOutcome> {
        let volume = self.volumes.music.as_ref()?;
        if !self.transport.music_available(self.music_check_timeout) {
            log::info!("Music archive not available; skipping music sync");
            return Some(VolumeOutcome::Unavailable);
        }
        if let Err(err) = self.mounts.ensure_mounted_with_retry(access, &volume.mount_point) {
            log::error!("Skipping music sync: {:#}", err);
            self.mounts.unmount(&volume.mount_point);
            return Some(VolumeOutcome::MountFailed);
        }

        let outcome = match self.transport.sync_music(&volume.mount_point) {
            Ok(()) => {
                log::info!("Music synced");
                VolumeOutcome::Transferred
            }
            Err(err) => {
                log::error!("Music sync failed: {:#}", err);
                VolumeOutcome::TransferFailed
            }
        };

        self.mounts.trim_free_space(access, &volume.mount_point);
        self.mounts.unmount(&volume.mount_point);
        Some(outcome)
    }
}
