//! rsync transfers to the archive server.

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct RsyncOptions {
    /// Delete source files once they are safely on the destination.
    pub remove_source_files: bool,
    /// Per-I/O timeout passed to rsync (`--timeout`), seconds.
    pub io_timeout_secs: Option<u64>,
    /// Extra rsync args (verbatim).
    pub extra_args: Vec<String>,
}

impl RsyncOptions {
    /// Options for moving recorded clips off a FAT volume.
    pub fn move_clips() -> Self {
        Self {
            remove_source_files: true,
            io_timeout_secs: Some(60),
            extra_args: vec![
                "-rltDvh".to_string(),
                "--no-perms".to_string(),
                "--omit-dir-times".to_string(),
                "--stats".to_string(),
            ],
        }
    }

    /// Options for mirroring the remote music library onto the music volume.
    pub fn mirror_music() -> Self {
        Self {
            remove_source_files: false,
            io_timeout_secs: Some(60),
            extra_args: vec![
                "-rltDvh".to_string(),
                "--no-perms".to_string(),
                "--omit-dir-times".to_string(),
                "--delete".to_string(),
                "--modify-window=2".to_string(),
            ],
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        if self.remove_source_files {
            args.push("--remove-source-files".to_string());
        }
        if let Some(secs) = self.io_timeout_secs {
            args.push(format!("--timeout={secs}"));
        }
        args
    }
}

pub trait RsyncOps {
    /// Run rsync from `src` (a local directory or `host:path`) to `dst`, streaming stdout
    /// line-by-line into `on_stdout_line`.
    ///
    /// Return an error if rsync fails. If `on_stdout_line` returns false, rsync should be aborted
    /// and the call should return an error.
    fn rsync_stream_stdout(
        &self,
        src: &str,
        dst: &str,
        opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()>;

    /// Convenience wrapper used when the caller only wants the transfer to happen.
    fn rsync(&self, src: &Path, dst: &str, opts: &RsyncOptions) -> HalResult<()> {
        let src = format!("{}/", src.display());
        self.rsync_stream_stdout(&src, dst, opts, &mut |line| {
            log::debug!("rsync: {line}");
            true
        })
    }
}
