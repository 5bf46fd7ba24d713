//! Process configuration.
//!
//! Read once at startup from a TOML file, validated, and then shared read-only with every
//! component. A missing file means "all defaults".

use crate::errors::StashError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dashstash/dashstash.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    SyncToServer,
    SyncToCloud,
    Disabled,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::SyncToServer => write!(f, "sync-to-server"),
            TransportKind::SyncToCloud => write!(f, "sync-to-cloud"),
            TransportKind::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub kind: TransportKind,
    /// Archive host name (probed for reachability).
    pub server: Option<String>,
    /// Address override; skips name resolution when set.
    pub server_address: Option<String>,
    /// Probe with a TCP connect to this port instead of ICMP.
    pub port: Option<u16>,
    pub probe_timeout_secs: u64,
    /// rsync destination (`user@host:/path`) or rclone remote (`remote:path`).
    pub destination: Option<String>,
    /// Remote music library, same syntax as `destination`.
    pub music_source: Option<String>,
    /// Clip folders (relative to the camera mount) holding one sub-folder per event.
    pub clip_dirs: Vec<String>,
    pub connect_command: Option<String>,
    pub disconnect_command: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Disabled,
            server: None,
            server_address: None,
            port: None,
            probe_timeout_secs: 2,
            destination: None,
            music_source: None,
            clip_dirs: vec![
                "TeslaCam/SavedClips".to_string(),
                "TeslaCam/SentryClips".to_string(),
            ],
            connect_command: None,
            disconnect_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumesConfig {
    pub camera_image: PathBuf,
    pub camera_mount: PathBuf,
    pub music_image: Option<PathBuf>,
    pub music_mount: PathBuf,
}

impl Default for VolumesConfig {
    fn default() -> Self {
        Self {
            camera_image: PathBuf::from("/backingfiles/cam_disk.bin"),
            camera_mount: PathBuf::from("/mnt/cam"),
            music_image: Some(PathBuf::from("/backingfiles/music_disk.bin")),
            music_mount: PathBuf::from("/mnt/music"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GadgetConfig {
    pub module: String,
    /// Parameters besides `file=`, which is derived from the present volumes.
    pub params: Vec<String>,
    pub platform_root: PathBuf,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            module: "g_mass_storage".to_string(),
            params: vec![
                "removable=1".to_string(),
                "ro=0".to_string(),
                "stall=0".to_string(),
                "iSerialNumber=123456".to_string(),
            ],
            platform_root: PathBuf::from(dashstash_hal::sysfs::gadget::DEFAULT_PLATFORM_ROOT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub command: String,
    pub interval_secs: u64,
    /// Upper bound on waiting for the host to stop writing before a scheduled snapshot.
    pub idle_wait_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "/root/bin/make_snapshot.sh".to_string(),
            interval_secs: 3480,
            idle_wait_secs: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerConfig {
    pub reachable: PathBuf,
    pub unreachable: PathBuf,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            reachable: PathBuf::from("/tmp/archive_is_reachable"),
            unreachable: PathBuf::from("/tmp/archive_is_unreachable"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepAwakeConfig {
    /// Exits 0 when the keep-awake mode is currently on.
    pub status_command: Option<String>,
    pub enable_command: Option<String>,
    pub disable_command: Option<String>,
}

impl KeepAwakeConfig {
    pub fn is_configured(&self) -> bool {
        self.status_command.is_some()
            && self.enable_command.is_some()
            && self.disable_command.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub title: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            title: "dashstash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedConfig {
    /// LED class directory; auto-detected (`led0`, then `ACT`) when unset.
    pub sysfs_dir: Option<PathBuf>,
    pub active_low: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub sync_command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sync_command: Some("sntp -S time.google.com".to_string()),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub path: PathBuf,
    pub max_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/mutable/archiveloop.log"),
            max_lines: 10_000,
        }
    }
}

/// Retry and polling cadence. Production values are the defaults; tests shrink them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub mount_attempts: u32,
    pub retry_interval_ms: u64,
    pub unreachable_attempts: u32,
    pub poll_interval_ms: u64,
    pub music_check_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mount_attempts: 10,
            retry_interval_ms: 1000,
            unreachable_attempts: 10,
            poll_interval_ms: 1000,
            music_check_timeout_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Zero delays everywhere; for tests.
    pub fn immediate() -> Self {
        Self {
            retry_interval_ms: 0,
            poll_interval_ms: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub settle_delay_secs: u64,
    pub lock_path: PathBuf,
    pub archive: ArchiveConfig,
    pub volumes: VolumesConfig,
    pub gadget: GadgetConfig,
    pub snapshots: SnapshotConfig,
    pub markers: MarkerConfig,
    pub keep_awake: KeepAwakeConfig,
    pub notify: NotifyConfig,
    pub led: LedConfig,
    pub clock: ClockConfig,
    pub log: LogConfig,
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_delay_secs: 20,
            lock_path: PathBuf::from("/run/dashstash.lock"),
            archive: ArchiveConfig::default(),
            volumes: VolumesConfig::default(),
            gadget: GadgetConfig::default(),
            snapshots: SnapshotConfig::default(),
            markers: MarkerConfig::default(),
            keep_awake: KeepAwakeConfig::default(),
            notify: NotifyConfig::default(),
            led: LedConfig::default(),
            clock: ClockConfig::default(),
            log: LogConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(content).map_err(|e| StashError::Config(e.to_string()))?;
        Ok(cfg)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Startup validation. Failures here are fatal; nothing later in the loop is.
    pub fn validate(&self) -> Result<(), StashError> {
        if self.volumes.camera_image.as_os_str().is_empty() {
            return Err(StashError::Config(
                "volumes.camera_image must be set".to_string(),
            ));
        }
        if self.archive.kind != TransportKind::Disabled {
            let has_target = self.archive.server.as_deref().is_some_and(|s| !s.is_empty())
                || self
                    .archive
                    .server_address
                    .as_deref()
                    .is_some_and(|s| !s.is_empty());
            if !has_target {
                return Err(StashError::Config(format!(
                    "archive.kind = {} requires archive.server or archive.server_address",
                    self.archive.kind
                )));
            }
            if self.archive.destination.is_none() {
                return Err(StashError::Config(format!(
                    "archive.kind = {} requires archive.destination",
                    self.archive.kind
                )));
            }
        }
        Ok(())
    }

    /// Resolve the archive target once. Call after [`Config::validate`].
    pub fn archive_endpoint(&self) -> Result<ArchiveEndpoint, StashError> {
        let timeout = Duration::from_secs(self.archive.probe_timeout_secs.max(1));
        if self.archive.kind == TransportKind::Disabled {
            return Ok(ArchiveEndpoint {
                kind: TransportKind::Disabled,
                address: String::new(),
                port: None,
                probe_timeout: timeout,
            });
        }

        let address = match (&self.archive.server_address, &self.archive.server) {
            (Some(addr), _) if !addr.is_empty() => addr.clone(),
            (_, Some(server)) if !server.is_empty() => resolve_host(server),
            _ => {
                return Err(StashError::Config(
                    "archive target could not be resolved: no server configured".to_string(),
                ))
            }
        };

        Ok(ArchiveEndpoint {
            kind: self.archive.kind,
            address,
            port: self.archive.port,
            probe_timeout: timeout,
        })
    }
}

/// Resolve `host` to an IP string, falling back to the name itself (the network may not be up
/// at boot; probes resolve again later).
fn resolve_host(host: &str) -> String {
    match (host, 0u16).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => {
                log::info!("Archive server {} resolved to {}", host, addr.ip());
                addr.ip().to_string()
            }
            None => host.to_string(),
        },
        Err(err) => {
            log::warn!("Could not resolve archive server {}: {}; will probe by name", host, err);
            host.to_string()
        }
    }
}

/// Where and how the archive lives. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEndpoint {
    pub kind: TransportKind,
    pub address: String,
    pub port: Option<u16>,
    pub probe_timeout: Duration,
}
