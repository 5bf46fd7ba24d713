//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.
//! It also models just enough kernel state (mount table, loop devices, the
//! gadget module) to check the volume ownership invariant.

use super::{
    FsOps, FsckReport, GadgetLun, LoopOps, ModuleOps, MountOps, NetOps, ProbeOps, ProcessOps,
    RsyncOps, RsyncOptions,
};
use crate::path::parent_device;
use crate::{HalError, HalResult};
use std::collections::{BTreeMap, HashMap, HashSet};
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Mount {
        target: PathBuf,
    },
    Unmount {
        target: PathBuf,
        lazy: bool,
    },
    LosetupAttach {
        image: PathBuf,
        scan_partitions: bool,
        loop_device: String,
    },
    LosetupDetach {
        loop_device: String,
    },
    Fsck {
        device: String,
    },
    Fstrim {
        mount_point: PathBuf,
    },
    LoadModule {
        name: String,
        params: Vec<String>,
    },
    UnloadModule {
        name: String,
    },
    Rsync {
        src: String,
        dst: String,
    },
    Command {
        program: String,
        args: Vec<String>,
        timeout_secs: u64,
    },
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths -> source device
    mounted: BTreeMap<PathBuf, String>,
    /// fstab: mount point -> backing image
    fstab: HashMap<PathBuf, PathBuf>,
    /// Attached loop devices -> backing image
    loops: BTreeMap<String, PathBuf>,
    next_loop: u32,
    /// Remaining forced failures per mount point (u32::MAX = always)
    mount_failures: HashMap<PathBuf, u32>,
    /// Mount points whose normal unmount reports EBUSY
    busy: HashSet<PathBuf>,
    loaded_modules: HashMap<String, Vec<String>>,
    /// Number of upcoming module loads after which no LUNs appear
    stuck_loads: u32,
    luns_visible: bool,
    fsck_exit_code: i32,
    reachable: bool,
    /// program -> (exit code, stdout)
    command_responses: HashMap<String, (i32, String)>,
    rsync_failures: u32,
    write_bytes: Option<u64>,
    invariant_violations: u32,
}

/// Fake HAL implementation that records operations without executing them.
///
/// This is designed for testing and CI environments where real system
/// operations would fail or be dangerous.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHalState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an fstab entry so `mount_fstab(target)` maps `image` through a loop device.
    pub fn with_fstab(self, target: impl Into<PathBuf>, image: impl Into<PathBuf>) -> Self {
        self.lock().fstab.insert(target.into(), image.into());
        self
    }

    /// Make the next `count` mounts of `target` fail.
    pub fn fail_mounts(&self, target: impl Into<PathBuf>, count: u32) {
        self.lock().mount_failures.insert(target.into(), count);
    }

    /// Make normal unmounts of `target` fail with EBUSY (lazy unmount still works).
    pub fn set_busy(&self, target: impl Into<PathBuf>) {
        self.lock().busy.insert(target.into());
    }

    /// The next `count` module loads succeed but expose no LUNs.
    pub fn stick_gadget_loads(&self, count: u32) {
        self.lock().stuck_loads = count;
    }

    pub fn set_fsck_exit_code(&self, code: i32) {
        self.lock().fsck_exit_code = code;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn set_command_response(&self, program: &str, code: i32, stdout: &str) {
        self.lock()
            .command_responses
            .insert(program.to_string(), (code, stdout.to_string()));
    }

    pub fn fail_rsyncs(&self, count: u32) {
        self.lock().rsync_failures = count;
    }

    pub fn set_write_bytes(&self, bytes: Option<u64>) {
        self.lock().write_bytes = bytes;
    }

    /// Pretend `target` is already mounted (e.g. left over from a previous run).
    pub fn preset_mounted(&self, target: impl Into<PathBuf>) {
        let mut state = self.lock();
        let loop_device = Self::allocate_loop(&mut state, PathBuf::from("/dev/null"));
        state
            .mounted
            .insert(target.into(), format!("{loop_device}p1"));
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    /// Count recorded operations matching `check`.
    pub fn count_operations(&self, check: impl Fn(&Operation) -> bool) -> usize {
        self.lock().operations.iter().filter(|op| check(op)).count()
    }

    /// Times the gadget was loaded while a volume was mounted locally, or a volume was
    /// mounted while the gadget was loaded.
    pub fn invariant_violations(&self) -> u32 {
        self.lock().invariant_violations
    }

    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        self.lock().mounted.keys().cloned().collect()
    }

    pub fn attached_loops(&self) -> Vec<String> {
        self.lock().loops.keys().cloned().collect()
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        self.lock().operations.clear();
    }

    fn record_operation(&self, op: Operation) {
        self.lock().operations.push(op);
    }

    fn allocate_loop(state: &mut FakeHalState, image: PathBuf) -> String {
        let loop_device = format!("/dev/loop{}", state.next_loop);
        state.next_loop += 1;
        state.loops.insert(loop_device.clone(), image);
        loop_device
    }
}

impl MountOps for FakeHal {
    fn mount_fstab(&self, target: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: mount {}", target.display());
        self.record_operation(Operation::Mount {
            target: target.to_path_buf(),
        });

        let mut state = self.lock();
        if let Some(remaining) = state.mount_failures.get_mut(target) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(HalError::CommandFailed {
                    program: "mount".to_string(),
                    code: Some(32),
                    stderr: format!("mount: {}: can't read superblock", target.display()),
                });
            }
        }
        if !state.loaded_modules.is_empty() {
            state.invariant_violations += 1;
        }
        let image = state
            .fstab
            .get(target)
            .cloned()
            .unwrap_or_else(|| PathBuf::from("/dev/null"));
        let loop_device = Self::allocate_loop(&mut state, image);
        state
            .mounted
            .insert(target.to_path_buf(), format!("{loop_device}p1"));
        Ok(())
    }

    fn unmount(&self, target: &Path, lazy: bool) -> HalResult<()> {
        log::info!("FAKE HAL: unmount {} (lazy: {})", target.display(), lazy);
        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
            lazy,
        });

        let mut state = self.lock();
        if !lazy && state.busy.contains(target) {
            return Err(HalError::Busy);
        }
        match state.mounted.remove(target) {
            Some(source) => {
                // `mount -o loop` style entries auto-clear their loop device.
                let parent = parent_device(&source);
                state.loops.remove(&parent);
                Ok(())
            }
            None => Err(HalError::NotMounted(target.display().to_string())),
        }
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let is_mounted = self.lock().mounted.contains_key(path);
        log::debug!("FAKE HAL: is_mounted({}) = {}", path.display(), is_mounted);
        Ok(is_mounted)
    }

    fn mount_source(&self, target: &Path) -> HalResult<Option<String>> {
        Ok(self.lock().mounted.get(target).cloned())
    }
}

impl LoopOps for FakeHal {
    fn losetup_attach(&self, image: &Path, scan_partitions: bool) -> HalResult<String> {
        let loop_device = Self::allocate_loop(&mut self.lock(), image.to_path_buf());
        log::info!(
            "FAKE HAL: losetup {} -> {}",
            image.display(),
            loop_device
        );
        self.record_operation(Operation::LosetupAttach {
            image: image.to_path_buf(),
            scan_partitions,
            loop_device: loop_device.clone(),
        });
        Ok(loop_device)
    }

    fn losetup_detach(&self, loop_device: &str) -> HalResult<()> {
        log::info!("FAKE HAL: losetup -d {}", loop_device);
        self.record_operation(Operation::LosetupDetach {
            loop_device: loop_device.to_string(),
        });
        self.lock().loops.remove(loop_device);
        Ok(())
    }

    fn loop_backing_file(&self, loop_device: &str) -> HalResult<PathBuf> {
        self.lock()
            .loops
            .get(loop_device)
            .cloned()
            .ok_or_else(|| HalError::Parse(format!("{loop_device} is not attached")))
    }
}

impl FsOps for FakeHal {
    fn fsck_repair(&self, device: &str) -> HalResult<FsckReport> {
        log::info!("FAKE HAL: fsck {} -- -a", device);
        self.record_operation(Operation::Fsck {
            device: device.to_string(),
        });
        Ok(FsckReport {
            exit_code: self.lock().fsck_exit_code,
            output: String::new(),
        })
    }

    fn fstrim(&self, mount_point: &Path) -> HalResult<String> {
        log::info!("FAKE HAL: fstrim {}", mount_point.display());
        self.record_operation(Operation::Fstrim {
            mount_point: mount_point.to_path_buf(),
        });
        if !self.lock().mounted.contains_key(mount_point) {
            return Err(HalError::NotMounted(mount_point.display().to_string()));
        }
        Ok(format!("{}: 0 B (0 bytes) trimmed", mount_point.display()))
    }

    fn extent_count(&self, _file: &Path) -> HalResult<u64> {
        Ok(1)
    }
}

impl ModuleOps for FakeHal {
    fn load_module(&self, name: &str, params: &[String]) -> HalResult<()> {
        log::info!("FAKE HAL: modprobe {} {}", name, params.join(" "));
        self.record_operation(Operation::LoadModule {
            name: name.to_string(),
            params: params.to_vec(),
        });
        let mut state = self.lock();
        if !state.mounted.is_empty() {
            state.invariant_violations += 1;
        }
        state
            .loaded_modules
            .insert(name.to_string(), params.to_vec());
        if state.stuck_loads > 0 {
            state.stuck_loads -= 1;
            state.luns_visible = false;
        } else {
            state.luns_visible = true;
        }
        Ok(())
    }

    fn unload_module(&self, name: &str) -> HalResult<()> {
        log::info!("FAKE HAL: modprobe -r {}", name);
        self.record_operation(Operation::UnloadModule {
            name: name.to_string(),
        });
        let mut state = self.lock();
        state.loaded_modules.remove(name);
        state.luns_visible = false;
        Ok(())
    }

    fn module_loaded(&self, name: &str) -> HalResult<bool> {
        Ok(self.lock().loaded_modules.contains_key(name))
    }
}

impl NetOps for FakeHal {
    fn tcp_reachable(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.lock().reachable
    }

    fn ping(&self, _host: &str, _timeout: Duration) -> bool {
        self.lock().reachable
    }
}

impl ProbeOps for FakeHal {
    fn gadget_luns(&self) -> HalResult<Vec<GadgetLun>> {
        let state = self.lock();
        if !state.luns_visible {
            return Ok(Vec::new());
        }
        // `file=a,b` in the module parameters -> one LUN per image.
        let files = state
            .loaded_modules
            .values()
            .flatten()
            .find_map(|p| p.strip_prefix("file="))
            .map(|f| f.split(',').map(PathBuf::from).collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(idx, file)| GadgetLun {
                path: PathBuf::from(format!("/sys/fake.usb/gadget/lun{idx}")),
                backing_file: Some(file),
            })
            .collect())
    }

    fn gadget_write_bytes(&self) -> HalResult<Option<u64>> {
        Ok(self.lock().write_bytes)
    }
}

impl ProcessOps for FakeHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: timeout.as_secs(),
        });
        let (code, stdout) = self
            .lock()
            .command_responses
            .get(program)
            .cloned()
            .unwrap_or((0, String::new()));

        #[cfg(unix)]
        let status = std::process::ExitStatus::from_raw(code << 8);
        #[cfg(not(unix))]
        let status = std::process::Command::new("true").status()?;

        Ok(Output {
            status,
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        })
    }
}

impl RsyncOps for FakeHal {
    fn rsync_stream_stdout(
        &self,
        src: &str,
        dst: &str,
        _opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()> {
        log::info!("FAKE HAL: rsync {} -> {}", src, dst);
        self.record_operation(Operation::Rsync {
            src: src.to_string(),
            dst: dst.to_string(),
        });
        let mut state = self.lock();
        if state.rsync_failures > 0 {
            state.rsync_failures -= 1;
            return Err(HalError::CommandFailed {
                program: "rsync".to_string(),
                code: Some(12),
                stderr: "rsync: connection unexpectedly closed".to_string(),
            });
        }
        drop(state);
        on_stdout_line("sent 0 bytes  received 0 bytes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_and_unmount_track_state() {
        let hal = FakeHal::new().with_fstab("/mnt/cam", "/backingfiles/cam_disk.bin");
        hal.mount_fstab(Path::new("/mnt/cam")).unwrap();
        assert!(hal.is_mounted(Path::new("/mnt/cam")).unwrap());

        let source = hal.mount_source(Path::new("/mnt/cam")).unwrap().unwrap();
        let backing = hal.loop_backing_file(&parent_device(&source)).unwrap();
        assert_eq!(backing, PathBuf::from("/backingfiles/cam_disk.bin"));

        hal.unmount(Path::new("/mnt/cam"), false).unwrap();
        assert!(!hal.is_mounted(Path::new("/mnt/cam")).unwrap());
        assert!(hal.attached_loops().is_empty());
    }

    #[test]
    fn scripted_mount_failures_run_out() {
        let hal = FakeHal::new();
        hal.fail_mounts("/mnt/cam", 2);
        assert!(hal.mount_fstab(Path::new("/mnt/cam")).is_err());
        assert!(hal.mount_fstab(Path::new("/mnt/cam")).is_err());
        assert!(hal.mount_fstab(Path::new("/mnt/cam")).is_ok());
    }

    #[test]
    fn busy_mounts_need_lazy_unmount() {
        let hal = FakeHal::new();
        hal.mount_fstab(Path::new("/mnt/music")).unwrap();
        hal.set_busy("/mnt/music");
        assert!(matches!(
            hal.unmount(Path::new("/mnt/music"), false),
            Err(HalError::Busy)
        ));
        hal.unmount(Path::new("/mnt/music"), true).unwrap();
        assert!(hal.mounted_paths().is_empty());
    }

    #[test]
    fn loading_gadget_while_mounted_is_a_violation() {
        let hal = FakeHal::new();
        hal.mount_fstab(Path::new("/mnt/cam")).unwrap();
        hal.load_module("g_mass_storage", &[]).unwrap();
        assert_eq!(hal.invariant_violations(), 1);
    }

    #[test]
    fn stuck_loads_hide_luns_once() {
        let hal = FakeHal::new();
        let params = vec!["file=/a.bin,/b.bin".to_string()];
        hal.stick_gadget_loads(1);
        hal.load_module("g_mass_storage", &params).unwrap();
        assert!(hal.gadget_luns().unwrap().is_empty());

        hal.unload_module("g_mass_storage").unwrap();
        hal.load_module("g_mass_storage", &params).unwrap();
        assert_eq!(hal.gadget_luns().unwrap().len(), 2);
    }

    #[test]
    fn command_responses_set_exit_status() {
        let hal = FakeHal::new();
        hal.set_command_response("sntp", 1, "");
        let out = hal
            .command_output("sntp", &["-S", "pool.ntp.org"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.status.code(), Some(1));
        assert!(hal
            .command_status("sntp", &[], Duration::from_secs(5))
            .is_err());
    }
}
