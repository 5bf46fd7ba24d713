//! Fake collaborators and a tempdir-backed rig for driving the control loop.

#![allow(dead_code)]

use anyhow::Result;
use dashstash_core::collaborators::{ArchiveTransport, IdleProbe, KeepAwake, Notifier, Snapshotter};
use dashstash_core::config::{Config, TimingConfig};
use dashstash_core::reachability::ReachabilityProbe;
use dashstash_core::status_led::{BlinkPattern, StatusIndicator};
use dashstash_core::waiter::PollWaiter;
use dashstash_hal::FakeHal;
use dashstash_workflow::control_loop::{ControlLoop, LoopParts};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Answers from a script, then `fallback` forever.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(script: &[bool], fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn is_reachable(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Disconnect,
    ArchiveClips(String),
    MusicAvailable,
    SyncMusic(PathBuf),
}

/// Moves clips by deleting them from the clip folder.
#[derive(Default)]
pub struct FakeTransport {
    pub refuse_connect: bool,
    pub fail_clips: bool,
    pub music_available: bool,
    pub fail_music: bool,
    pub(crate) calls: Mutex<Vec<TransportCall>>,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn archived(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::ArchiveClips(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ArchiveTransport for FakeTransport {
    fn connect(&self) -> bool {
        self.record(TransportCall::Connect);
        !self.refuse_connect
    }

    fn disconnect(&self) {
        self.record(TransportCall::Disconnect);
    }

    fn archive_clips(&self, clip_dir: &Path, name: &str) -> Result<()> {
        self.record(TransportCall::ArchiveClips(name.to_string()));
        if self.fail_clips {
            anyhow::bail!("connection reset");
        }
        for entry in fs::read_dir(clip_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                for file in fs::read_dir(&path)? {
                    fs::remove_file(file?.path())?;
                }
            } else {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn music_available(&self, _timeout: Duration) -> bool {
        self.record(TransportCall::MusicAvailable);
        self.music_available
    }

    fn sync_music(&self, music_root: &Path) -> Result<()> {
        self.record(TransportCall::SyncMusic(music_root.to_path_buf()));
        if self.fail_music {
            anyhow::bail!("music library went away");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeKeepAwake {
    pub enabled: Mutex<bool>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeKeepAwake {
    pub fn already_on() -> Self {
        Self {
            enabled: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl KeepAwake for FakeKeepAwake {
    fn is_enabled(&self) -> Result<bool> {
        self.calls.lock().unwrap().push("status");
        Ok(*self.enabled.lock().unwrap())
    }

    fn enable(&self) -> Result<()> {
        self.calls.lock().unwrap().push("enable");
        *self.enabled.lock().unwrap() = true;
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.calls.lock().unwrap().push("disable");
        *self.enabled.lock().unwrap() = false;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, _title: &str, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingSnapshotter {
    calls: AtomicUsize,
}

impl CountingSnapshotter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Snapshotter for CountingSnapshotter {
    fn snapshot(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct AlwaysIdle;

impl IdleProbe for AlwaysIdle {
    fn wait_for_idle(&self) -> bool {
        true
    }
}

#[derive(Clone, Default)]
pub struct RecordingIndicator {
    shown: Arc<Mutex<Vec<BlinkPattern>>>,
}

impl RecordingIndicator {
    pub fn shown(&self) -> Vec<BlinkPattern> {
        self.shown.lock().unwrap().clone()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&self, pattern: BlinkPattern) {
        self.shown.lock().unwrap().push(pattern);
    }
}

/// A complete control loop over a [`FakeHal`] and tempdir volumes.
pub struct Rig {
    pub dir: TempDir,
    pub hal: FakeHal,
    pub cfg: Config,
    pub probe: Arc<ScriptedProbe>,
    pub transport: Arc<FakeTransport>,
    pub keep_awake: Arc<FakeKeepAwake>,
    pub notifier: Arc<RecordingNotifier>,
    pub snapshotter: Arc<CountingSnapshotter>,
    pub indicator: RecordingIndicator,
}

impl Rig {
    /// Camera volume only; the probe answers `script` and then "unreachable".
    pub fn new(script: &[bool]) -> Self {
        Self::build(script, false, FakeTransport::default())
    }

    pub fn with_music(script: &[bool], transport: FakeTransport) -> Self {
        Self::build(script, true, transport)
    }

    pub fn with_transport(script: &[bool], transport: FakeTransport) -> Self {
        Self::build(script, false, transport)
    }

    fn build(script: &[bool], music: bool, transport: FakeTransport) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut cfg = Config {
            settle_delay_secs: 0,
            lock_path: root.join("dashstash.lock"),
            timing: TimingConfig::immediate(),
            ..Config::default()
        };
        cfg.volumes.camera_image = root.join("cam_disk.bin");
        cfg.volumes.camera_mount = root.join("cam");
        cfg.volumes.music_image = Some(root.join("music_disk.bin"));
        cfg.volumes.music_mount = root.join("music");
        cfg.markers.reachable = root.join("archive_is_reachable");
        cfg.markers.unreachable = root.join("archive_is_unreachable");
        cfg.log.path = root.join("archiveloop.log");

        fs::write(&cfg.volumes.camera_image, b"").unwrap();
        fs::create_dir_all(&cfg.volumes.camera_mount).unwrap();
        fs::create_dir_all(&cfg.volumes.music_mount).unwrap();
        if music {
            fs::write(root.join("music_disk.bin"), b"").unwrap();
        }

        let hal = FakeHal::new()
            .with_fstab(&cfg.volumes.camera_mount, &cfg.volumes.camera_image)
            .with_fstab(&cfg.volumes.music_mount, root.join("music_disk.bin"));

        Self {
            dir,
            hal,
            cfg,
            probe: Arc::new(ScriptedProbe::new(script, false)),
            transport: Arc::new(transport),
            keep_awake: Arc::new(FakeKeepAwake::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            snapshotter: Arc::new(CountingSnapshotter::default()),
            indicator: RecordingIndicator::default(),
        }
    }

    pub fn camera_mount(&self) -> PathBuf {
        self.cfg.volumes.camera_mount.clone()
    }

    pub fn music_mount(&self) -> PathBuf {
        self.cfg.volumes.music_mount.clone()
    }

    /// Create `folders` event folders under `clip_dir` with `files` files spread over them.
    pub fn add_events(&self, clip_dir: &str, folders: usize, files: usize) {
        let root = self.camera_mount().join(clip_dir);
        for f in 0..folders {
            let event = root.join(format!("2024-05-0{}_12-00-00", f + 1));
            fs::create_dir_all(&event).unwrap();
        }
        for i in 0..files {
            let event = root.join(format!("2024-05-0{}_12-00-00", i % folders + 1));
            fs::write(event.join(format!("front-{i}.mp4")), b"clip").unwrap();
        }
    }

    pub fn control_loop(&self) -> ControlLoop {
        let parts = LoopParts {
            probe: self.probe.clone(),
            waiter: Box::new(PollWaiter::new(Duration::ZERO)),
            transport: self.transport.clone(),
            keep_awake: self.keep_awake.clone(),
            notifier: self.notifier.clone(),
            snapshotter: self.snapshotter.clone(),
            idle: Arc::new(AlwaysIdle),
            indicator: Box::new(self.indicator.clone()),
        };
        ControlLoop::new(Arc::new(self.cfg.clone()), Arc::new(self.hal.clone()), parts)
    }
}
