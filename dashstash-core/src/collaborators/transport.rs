use super::ArchiveTransport;
use anyhow::{bail, Context, Result};
use dashstash_hal::{ProcessOps, RsyncOps, RsyncOptions, SystemHal};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const HOOK_TIMEOUT: Duration = Duration::from_secs(120);
const RCLONE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Optional commands run around an archive session (mounting a share, bringing up a VPN).
#[derive(Debug, Clone, Default)]
pub struct SessionHooks {
    pub connect: Option<String>,
    pub disconnect: Option<String>,
}

impl SessionHooks {
    fn connect<H: ProcessOps + ?Sized>(&self, hal: &H) -> bool {
        let Some(command) = &self.connect else {
            return true;
        };
        match hal.command_line_status(command, HOOK_TIMEOUT) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Archive connect command failed: {}", err);
                false
            }
        }
    }

    fn disconnect<H: ProcessOps + ?Sized>(&self, hal: &H) {
        if let Some(command) = &self.disconnect {
            if let Err(err) = hal.command_line_status(command, HOOK_TIMEOUT) {
                log::warn!("Archive disconnect command failed: {}", err);
            }
        }
    }
}

fn join_remote(base: &str, name: &str) -> String {
    format!("{}/{}/", base.trim_end_matches('/'), name.trim_matches('/'))
}

/// Archive over rsync to a server (`user@host:/path`).
pub struct RsyncTransport {
    hal: Arc<dyn SystemHal>,
    destination: String,
    music_source: Option<String>,
    hooks: SessionHooks,
}

impl RsyncTransport {
    pub fn new(
        hal: Arc<dyn SystemHal>,
        destination: impl Into<String>,
        music_source: Option<String>,
        hooks: SessionHooks,
    ) -> Self {
        Self {
            hal,
            destination: destination.into(),
            music_source,
            hooks,
        }
    }
}

impl ArchiveTransport for RsyncTransport {
    fn connect(&self) -> bool {
        self.hooks.connect(self.hal.as_ref())
    }

    fn disconnect(&self) {
        self.hooks.disconnect(self.hal.as_ref())
    }

    fn archive_clips(&self, clip_dir: &Path, name: &str) -> Result<()> {
        let dst = join_remote(&self.destination, name);
        self.hal
            .rsync(clip_dir, &dst, &RsyncOptions::move_clips())
            .with_context(|| format!("rsync {} -> {}", clip_dir.display(), dst))
    }

    fn music_available(&self, timeout: Duration) -> bool {
        let Some(source) = &self.music_source else {
            return false;
        };
        let listing = format!("{}/", source.trim_end_matches('/'));
        match self.hal.command_output("rsync", &["--list-only", &listing], timeout) {
            Ok(output) => output.status.success(),
            Err(err) => {
                log::info!("Music library not available: {}", err);
                false
            }
        }
    }

    fn sync_music(&self, music_root: &Path) -> Result<()> {
        let Some(source) = &self.music_source else {
            bail!("no music source configured");
        };
        let src = format!("{}/", source.trim_end_matches('/'));
        let dst = format!("{}/", music_root.display());
        self.hal
            .rsync_stream_stdout(&src, &dst, &RsyncOptions::mirror_music(), &mut |line| {
                log::debug!("rsync: {line}");
                true
            })
            .with_context(|| format!("rsync {} -> {}", src, dst))
    }
}

/// Archive through rclone to a cloud remote (`remote:path`).
pub struct RcloneTransport {
    hal: Arc<dyn SystemHal>,
    destination: String,
    music_source: Option<String>,
    hooks: SessionHooks,
}

impl RcloneTransport {
    pub fn new(
        hal: Arc<dyn SystemHal>,
        destination: impl Into<String>,
        music_source: Option<String>,
        hooks: SessionHooks,
    ) -> Self {
        Self {
            hal,
            destination: destination.into(),
            music_source,
            hooks,
        }
    }
}

impl ArchiveTransport for RcloneTransport {
    fn connect(&self) -> bool {
        self.hooks.connect(self.hal.as_ref())
    }

    fn disconnect(&self) {
        self.hooks.disconnect(self.hal.as_ref())
    }

    fn archive_clips(&self, clip_dir: &Path, name: &str) -> Result<()> {
        let src = clip_dir.to_string_lossy();
        let dst = join_remote(&self.destination, name);
        self.hal
            .command_status(
                "rclone",
                &["move", &src, &dst, "--create-empty-src-dirs", "--delete-empty-src-dirs"],
                RCLONE_TIMEOUT,
            )
            .with_context(|| format!("rclone move {} -> {}", src, dst))
    }

    fn music_available(&self, timeout: Duration) -> bool {
        let Some(source) = &self.music_source else {
            return false;
        };
        match self
            .hal
            .command_output("rclone", &["lsf", "--max-depth", "1", source], timeout)
        {
            Ok(output) => output.status.success(),
            Err(err) => {
                log::info!("Music library not available: {}", err);
                false
            }
        }
    }

    fn sync_music(&self, music_root: &Path) -> Result<()> {
        let Some(source) = &self.music_source else {
            bail!("no music source configured");
        };
        let dst = music_root.to_string_lossy();
        self.hal
            .command_status("rclone", &["sync", source, &dst], RCLONE_TIMEOUT)
            .with_context(|| format!("rclone sync {} -> {}", source, dst))
    }
}

/// Archiving turned off: never connects, so the cycle is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

impl ArchiveTransport for DisabledTransport {
    fn connect(&self) -> bool {
        false
    }

    fn disconnect(&self) {}

    fn archive_clips(&self, _clip_dir: &Path, _name: &str) -> Result<()> {
        bail!("archiving is disabled")
    }

    fn music_available(&self, _timeout: Duration) -> bool {
        false
    }

    fn sync_music(&self, _music_root: &Path) -> Result<()> {
        bail!("archiving is disabled")
    }
}
