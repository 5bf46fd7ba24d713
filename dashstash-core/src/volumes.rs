//! Backing volumes presented to the host.

use crate::config::VolumesConfig;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeId {
    Camera,
    Music,
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeId::Camera => write!(f, "camera"),
            VolumeId::Music => write!(f, "music"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackingVolume {
    pub id: VolumeId,
    pub image: PathBuf,
    pub mount_point: PathBuf,
}

/// The configured volumes. The camera volume always exists; music is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volumes {
    pub camera: BackingVolume,
    pub music: Option<BackingVolume>,
}

impl Volumes {
    /// Build from config. The music volume is present only if its image file exists.
    pub fn from_config(cfg: &VolumesConfig) -> Self {
        let music = cfg
            .music_image
            .as_ref()
            .filter(|image| image.exists())
            .map(|image| BackingVolume {
                id: VolumeId::Music,
                image: image.clone(),
                mount_point: cfg.music_mount.clone(),
            });
        if music.is_none() {
            log::info!("No music volume present");
        }
        Self {
            camera: BackingVolume {
                id: VolumeId::Camera,
                image: cfg.camera_image.clone(),
                mount_point: cfg.camera_mount.clone(),
            },
            music,
        }
    }

    /// Present volumes, camera first. This is also the gadget LUN order.
    pub fn iter(&self) -> impl Iterator<Item = &BackingVolume> {
        std::iter::once(&self.camera).chain(self.music.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn music_requires_an_image_file() {
        let dir = tempdir().unwrap();
        let mut cfg = VolumesConfig {
            music_image: Some(dir.path().join("music_disk.bin")),
            ..VolumesConfig::default()
        };
        assert!(Volumes::from_config(&cfg).music.is_none());

        std::fs::write(dir.path().join("music_disk.bin"), b"").unwrap();
        let volumes = Volumes::from_config(&cfg);
        assert_eq!(volumes.iter().count(), 2);
        assert_eq!(volumes.iter().next().unwrap().id, VolumeId::Camera);

        cfg.music_image = None;
        assert_eq!(Volumes::from_config(&cfg).iter().count(), 1);
    }
}
