/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Host filesystem adapter resolving absolute paths under a configurable root

use crate::domain::SystemError;
use crate::ports::HostFilesystem;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reads sysfs/procfs paths relative to `root`
///
/// The root is `/` on a live host; tests and offline analysis point it at a
/// captured tree.
#[derive(Debug, Clone)]
pub struct RootedFilesystem {
    root: PathBuf,
}

impl RootedFilesystem {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The live host
    pub fn host() -> Self {
        Self::new("/")
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn io_error(path: &str, e: std::io::Error) -> SystemError {
        match e.kind() {
            ErrorKind::PermissionDenied => SystemError::PermissionDenied(format!("{path}: {e}")),
            _ => SystemError::IoError(format!("{path}: {e}")),
        }
    }
}

#[async_trait]
impl HostFilesystem for RootedFilesystem {
    async fn read_to_string(&self, path: &str) -> Result<String, SystemError> {
        fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| Self::io_error(path, e))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, SystemError> {
        let mut entries = fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| Self::io_error(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> bool {
        fs::symlink_metadata(self.resolve(path)).await.is_ok()
    }

    async fn link_target_name(&self, path: &str) -> Result<String, SystemError> {
        let target = fs::read_link(self.resolve(path))
            .await
            .map_err(|e| Self::io_error(path, e))?;
        target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| SystemError::ParseError(format!("{path}: link has no final component")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_paths_resolve_under_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/block/sdb")).unwrap();
        std::fs::create_dir_all(dir.path().join("sys/block/sda")).unwrap();
        std::fs::write(dir.path().join("sys/block/sda/size"), "2048\n").unwrap();

        let filesystem = RootedFilesystem::new(dir.path());
        assert_eq!(
            filesystem.list_dir("/sys/block").await.unwrap(),
            vec!["sda", "sdb"]
        );
        assert_eq!(
            filesystem.read_to_string("/sys/block/sda/size").await.unwrap(),
            "2048\n"
        );
        assert!(filesystem.exists("/sys/block/sdb").await);
        assert!(!filesystem.exists("/sys/block/sdc").await);
        assert!(matches!(
            filesystem.read_to_string("/proc/mdstat").await,
            Err(SystemError::IoError(_))
        ));
    }

    #[tokio::test]
    async fn test_link_target_name() {
        let dir = tempdir().unwrap();
        let device = dir.path().join("sys/bus/pci/devices/0000:1a:00.0");
        std::fs::create_dir_all(&device).unwrap();
        std::os::unix::fs::symlink("../../../bus/pci/drivers/mlx5_core", device.join("driver"))
            .unwrap();

        let filesystem = RootedFilesystem::new(dir.path());
        assert_eq!(
            filesystem
                .link_target_name("/sys/bus/pci/devices/0000:1a:00.0/driver")
                .await
                .unwrap(),
            "mlx5_core"
        );
    }
}
