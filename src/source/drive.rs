//! Block-device (config-drive) metadata source.
//!
//! The platform attaches a small read-only FAT volume holding one metadata
//! file. The device is identified by its reported sector count, read from
//! the per-device sysfs `size` attribute so discovery needs no extra
//! privilege. Mounting is guarded by a live mount-table check, so a shared
//! source never double-mounts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::MetadataError;
use crate::source::Source;

/// Default expected sector count of the config drive.
pub const DEFAULT_EXPECTED_SECTORS: u64 = 40_960;

/// Configuration for a [`DriveSource`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Directory of per-device sysfs entries.
    pub sys_block_dir: PathBuf,
    /// Directory where device nodes live.
    pub dev_dir: PathBuf,
    /// Mount table to consult before mounting.
    pub mounts_path: PathBuf,
    /// Sector count identifying the config drive.
    pub expected_sectors: u64,
    /// Fixed mountpoint for the volume.
    pub mountpoint: PathBuf,
    /// Filename of the metadata file on the volume.
    pub metadata_file: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            sys_block_dir: PathBuf::from("/sys/block"),
            dev_dir: PathBuf::from("/dev"),
            mounts_path: PathBuf::from("/proc/mounts"),
            expected_sectors: DEFAULT_EXPECTED_SECTORS,
            mountpoint: PathBuf::from("/mnt/metadata"),
            metadata_file: "meta_data".to_string(),
        }
    }
}

/// Metadata source over an attached config-drive volume.
pub struct DriveSource {
    config: DriveConfig,
    finished: AtomicBool,
}

impl DriveSource {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            finished: AtomicBool::new(false),
        }
    }

    /// Find the device node whose sector count matches the configured value.
    async fn find_device(&self) -> Result<PathBuf, MetadataError> {
        let mut entries = tokio::fs::read_dir(&self.config.sys_block_dir)
            .await
            .map_err(|e| {
                MetadataError::QueryFailed(format!(
                    "{}: {}",
                    self.config.sys_block_dir.display(),
                    e
                ))
            })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("device scan: {}", e)))?
        {
            let size_path = entry.path().join("size");
            let Ok(size_text) = tokio::fs::read_to_string(&size_path).await else {
                continue;
            };
            let Ok(sectors) = size_text.trim().parse::<u64>() else {
                continue;
            };
            if sectors == self.config.expected_sectors {
                return Ok(self.config.dev_dir.join(entry.file_name()));
            }
        }

        Err(MetadataError::QueryFailed(format!(
            "no block device with {} sectors",
            self.config.expected_sectors
        )))
    }

    /// Whether the configured mountpoint already appears in the mount table.
    async fn is_mounted(&self) -> Result<bool, MetadataError> {
        let mounts = tokio::fs::read_to_string(&self.config.mounts_path)
            .await
            .map_err(|e| {
                MetadataError::QueryFailed(format!("{}: {}", self.config.mounts_path.display(), e))
            })?;
        let mountpoint = self.config.mountpoint.to_string_lossy();
        Ok(mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mnt| mnt == mountpoint))
    }

    async fn mount(&self, device: &PathBuf) -> Result<(), MetadataError> {
        tokio::fs::create_dir_all(&self.config.mountpoint)
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("mountpoint: {}", e)))?;

        let status = Command::new("mount")
            .arg("-o")
            .arg("ro")
            .arg("-t")
            .arg("vfat")
            .arg(device)
            .arg(&self.config.mountpoint)
            .status()
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("mount: {}", e)))?;

        if !status.success() {
            return Err(MetadataError::QueryFailed(format!(
                "mount {} exited with {}",
                device.display(),
                status
            )));
        }
        tracing::info!(device = %device.display(), mountpoint = %self.config.mountpoint.display(), "mounted config drive");
        Ok(())
    }
}

#[async_trait]
impl Source for DriveSource {
    async fn query(&self, _path: &str) -> Result<String, MetadataError> {
        let device = self.find_device().await?;
        if !self.is_mounted().await? {
            self.mount(&device).await?;
        }

        let file = self.config.mountpoint.join(&self.config.metadata_file);
        let contents = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("{}: {}", file.display(), e)))?;

        if contents.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(contents)
    }

    async fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("drive source finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(dir: &tempfile::TempDir, devices: &[(&str, &str)]) -> PathBuf {
        let sys = dir.path().join("sys_block");
        for (name, size) in devices {
            let dev = sys.join(name);
            std::fs::create_dir_all(&dev).unwrap();
            std::fs::write(dev.join("size"), size).unwrap();
        }
        sys
    }

    #[tokio::test]
    async fn test_find_device_by_sector_count() {
        let dir = tempfile::tempdir().unwrap();
        let sys = fake_sysfs(&dir, &[("sda", "41943040\n"), ("sdb", "40960\n")]);

        let source = DriveSource::new(DriveConfig {
            sys_block_dir: sys,
            dev_dir: PathBuf::from("/dev"),
            expected_sectors: 40_960,
            ..DriveConfig::default()
        });
        assert_eq!(source.find_device().await.unwrap(), PathBuf::from("/dev/sdb"));
    }

    #[tokio::test]
    async fn test_no_matching_device_is_query_failed() {
        let dir = tempfile::tempdir().unwrap();
        let sys = fake_sysfs(&dir, &[("sda", "41943040\n")]);

        let source = DriveSource::new(DriveConfig {
            sys_block_dir: sys,
            expected_sectors: 40_960,
            ..DriveConfig::default()
        });
        assert!(matches!(
            source.find_device().await,
            Err(MetadataError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_is_mounted_checks_mount_table() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = dir.path().join("mounts");
        std::fs::write(
            &mounts,
            "/dev/sda1 / ext4 rw 0 0\n/dev/sdb /mnt/metadata vfat ro 0 0\n",
        )
        .unwrap();

        let mounted = DriveSource::new(DriveConfig {
            mounts_path: mounts.clone(),
            mountpoint: PathBuf::from("/mnt/metadata"),
            ..DriveConfig::default()
        });
        assert!(mounted.is_mounted().await.unwrap());

        let unmounted = DriveSource::new(DriveConfig {
            mounts_path: mounts,
            mountpoint: PathBuf::from("/mnt/elsewhere"),
            ..DriveConfig::default()
        });
        assert!(!unmounted.is_mounted().await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_metadata_file_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let sys = fake_sysfs(&dir, &[("sdb", "40960\n")]);
        let mounts = dir.path().join("mounts");
        let mountpoint = dir.path().join("mnt");
        std::fs::create_dir_all(&mountpoint).unwrap();
        std::fs::write(
            &mounts,
            format!("/dev/sdb {} vfat ro 0 0\n", mountpoint.display()),
        )
        .unwrap();
        std::fs::write(mountpoint.join("meta_data"), "  \n").unwrap();

        let source = DriveSource::new(DriveConfig {
            sys_block_dir: sys,
            mounts_path: mounts,
            mountpoint,
            expected_sectors: 40_960,
            metadata_file: "meta_data".to_string(),
            ..DriveConfig::default()
        });
        assert_eq!(source.query("meta-data").await.unwrap(), "");
    }
}
