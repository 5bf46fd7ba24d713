//! Linux HAL implementation using real system calls.

use super::{
    FsOps, FsckReport, GadgetLun, LoopOps, ModuleOps, MountOps, NetOps, ProbeOps, ProcessOps,
    RsyncOps, RsyncOptions,
};
use crate::procfs::{mountinfo, process_io};
use crate::sysfs::{block, gadget};
use crate::{HalError, HalResult};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
///
/// The sysfs/procfs roots are fields so probes can be pointed at fixture trees.
#[derive(Debug, Clone)]
pub struct LinuxHal {
    platform_root: PathBuf,
    sys_block_root: PathBuf,
    proc_root: PathBuf,
}

impl Default for LinuxHal {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxHal {
    pub fn new() -> Self {
        Self {
            platform_root: PathBuf::from(gadget::DEFAULT_PLATFORM_ROOT),
            sys_block_root: PathBuf::from("/sys/block"),
            proc_root: PathBuf::from("/proc"),
        }
    }

    pub fn with_platform_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.platform_root = root.into();
        self
    }
}

const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);
const LOSETUP_TIMEOUT: Duration = Duration::from_secs(30);
const FSCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const FSTRIM_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MODPROBE_TIMEOUT: Duration = Duration::from_secs(60);
const RSYNC_MAX_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    // Avoid commands hanging waiting for input.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn status_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    let output = output_with_timeout(program, cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(output)
}

fn map_nix_err(err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::Busy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied,
        other => HalError::Nix(other),
    }
}

impl LinuxHal {
    fn mount_entries(&self) -> HalResult<Vec<mountinfo::MountInfo>> {
        let content = fs::read_to_string(self.proc_root.join("self/mountinfo"))?;
        Ok(mountinfo::parse_mountinfo(&content))
    }
}

impl MountOps for LinuxHal {
    fn mount_fstab(&self, target: &Path) -> HalResult<()> {
        let mut cmd = Command::new("mount");
        cmd.arg(target);
        status_with_timeout("mount", &mut cmd, MOUNT_TIMEOUT)?;
        Ok(())
    }

    fn unmount(&self, target: &Path, lazy: bool) -> HalResult<()> {
        let flags = if lazy {
            nix::mount::MntFlags::MNT_DETACH
        } else {
            nix::mount::MntFlags::empty()
        };
        nix::mount::umount2(target, flags).map_err(map_nix_err)?;
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let entries = self.mount_entries()?;
        Ok(mountinfo::is_mounted_from_info(path, &entries))
    }

    fn mount_source(&self, target: &Path) -> HalResult<Option<String>> {
        let entries = self.mount_entries()?;
        Ok(mountinfo::find_mount(target, &entries).map(|e| e.source.clone()))
    }
}

impl LoopOps for LinuxHal {
    fn losetup_attach(&self, image: &Path, scan_partitions: bool) -> HalResult<String> {
        let mut args = vec!["--show".to_string(), "-f".to_string()];
        if scan_partitions {
            args.push("-P".to_string());
        }
        args.push(image.display().to_string());

        let mut cmd = Command::new("losetup");
        cmd.args(&args);
        let output = status_with_timeout("losetup", &mut cmd, LOSETUP_TIMEOUT)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn losetup_detach(&self, loop_device: &str) -> HalResult<()> {
        let mut cmd = Command::new("losetup");
        cmd.args(["-d", loop_device]);
        status_with_timeout("losetup", &mut cmd, LOSETUP_TIMEOUT)?;
        Ok(())
    }

    fn loop_backing_file(&self, loop_device: &str) -> HalResult<PathBuf> {
        block::loop_backing_file_in(&self.sys_block_root, Path::new(loop_device))
    }
}

impl FsOps for LinuxHal {
    fn fsck_repair(&self, device: &str) -> HalResult<FsckReport> {
        let mut cmd = Command::new("fsck");
        cmd.args([device, "--", "-a"]);
        let output = output_with_timeout("fsck", &mut cmd, FSCK_TIMEOUT)?;
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(FsckReport {
            // Killed by a signal: report as an operational error bit.
            exit_code: output.status.code().unwrap_or(8),
            output: text.trim().to_string(),
        })
    }

    fn fstrim(&self, mount_point: &Path) -> HalResult<String> {
        let mut cmd = Command::new("fstrim");
        cmd.arg("-v").arg(mount_point);
        let output = status_with_timeout("fstrim", &mut cmd, FSTRIM_TIMEOUT)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn extent_count(&self, file: &Path) -> HalResult<u64> {
        let mut cmd = Command::new("filefrag");
        cmd.arg(file);
        let output = status_with_timeout("filefrag", &mut cmd, PROBE_TIMEOUT)?;
        super::parse_filefrag_extents(&String::from_utf8_lossy(&output.stdout))
    }
}

impl ModuleOps for LinuxHal {
    fn load_module(&self, name: &str, params: &[String]) -> HalResult<()> {
        let mut cmd = Command::new("modprobe");
        cmd.arg(name).args(params);
        status_with_timeout("modprobe", &mut cmd, MODPROBE_TIMEOUT)?;
        Ok(())
    }

    fn unload_module(&self, name: &str) -> HalResult<()> {
        let mut cmd = Command::new("modprobe");
        cmd.args(["-r", name]);
        status_with_timeout("modprobe", &mut cmd, MODPROBE_TIMEOUT)?;
        Ok(())
    }

    fn module_loaded(&self, name: &str) -> HalResult<bool> {
        let content = fs::read_to_string(self.proc_root.join("modules"))?;
        Ok(content
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .any(|m| m == name))
    }
}

impl NetOps for LinuxHal {
    fn tcp_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        let addrs = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                log::debug!("failed to resolve {host}: {err}");
                return false;
            }
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, timeout).is_ok() {
                return true;
            }
        }
        false
    }

    fn ping(&self, host: &str, timeout: Duration) -> bool {
        let deadline = timeout.as_secs().max(1).to_string();
        let mut cmd = Command::new("ping");
        cmd.args(["-q", "-c", "1", "-w", &deadline, host]);
        match output_with_timeout("ping", &mut cmd, timeout + Duration::from_secs(1)) {
            Ok(output) => output.status.success(),
            Err(err) => {
                log::debug!("ping {host} failed: {err}");
                false
            }
        }
    }
}

impl ProbeOps for LinuxHal {
    fn gadget_luns(&self) -> HalResult<Vec<GadgetLun>> {
        gadget::scan_gadget_luns_in(&self.platform_root)
    }

    fn gadget_write_bytes(&self) -> HalResult<Option<u64>> {
        let Some(dir) = process_io::find_pid_by_comm(&self.proc_root, process_io::FILE_STORAGE_COMM)
        else {
            return Ok(None);
        };
        let content = fs::read_to_string(dir.join("io"))?;
        Ok(process_io::parse_write_bytes(&content))
    }
}

impl ProcessOps for LinuxHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        output_with_timeout(program, &mut cmd, timeout)
    }
}

impl RsyncOps for LinuxHal {
    fn rsync_stream_stdout(
        &self,
        src: &str,
        dst: &str,
        opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()> {
        let mut args = opts.to_args();
        args.push(src.to_string());
        args.push(dst.to_string());

        let mut child = Command::new("rsync")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| map_command_err("rsync", e))?;

        // Drain stderr in the background to avoid deadlocks if rsync is chatty.
        let mut stderr_handle = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut s = String::new();
                let mut reader = BufReader::new(stderr);
                let _ = reader.read_to_string(&mut s);
                s
            })
        });

        let (tx, rx) = mpsc::channel::<io::Result<String>>();
        if let Some(stdout) = child.stdout.take() {
            std::thread::spawn(move || forward_lines(stdout, &tx));
        }

        let start = Instant::now();
        loop {
            if start.elapsed() > RSYNC_MAX_TIMEOUT {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HalError::CommandTimeout {
                    program: "rsync".to_string(),
                    timeout_secs: RSYNC_MAX_TIMEOUT.as_secs(),
                });
            }

            match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(Ok(line)) => {
                    if !on_stdout_line(&line) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(HalError::Other("rsync cancelled".to_string()));
                    }
                }
                Ok(Err(err)) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HalError::Io(err));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        // stdout closed; rsync is exiting.
        let status = match child
            .wait_timeout(Duration::from_secs(30))
            .map_err(HalError::Io)?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HalError::CommandTimeout {
                    program: "rsync".to_string(),
                    timeout_secs: 30,
                });
            }
        };
        let stderr_s = stderr_handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(HalError::CommandFailed {
                program: "rsync".to_string(),
                code: status.code(),
                stderr: stderr_s.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Send each line of `reader` to `tx`. File names in rsync output are not guaranteed to
/// be UTF-8, so invalid bytes are replaced rather than ending the stream.
fn forward_lines(reader: impl Read, tx: &mpsc::Sender<io::Result<String>>) {
    let reader = BufReader::new(reader);
    for chunk in reader.split(b'\n') {
        let line = chunk.map(|bytes| {
            let line = String::from_utf8_lossy(&bytes);
            line.strip_suffix('\r').unwrap_or(&line).to_string()
        });
        let failed = line.is_err();
        if tx.send(line).is_err() || failed {
            break;
        }
    }
}
