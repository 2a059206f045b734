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

use crate::domain::SystemError;
use async_trait::async_trait;

/// Secondary port - read-only view of the host's sysfs/procfs/dev trees
///
/// Paths are absolute host paths (e.g. `/sys/block`); adapters decide where
/// that root actually lives.
#[async_trait]
pub trait HostFilesystem: Send + Sync {
    /// Read a whole file as text
    async fn read_to_string(&self, path: &str) -> Result<String, SystemError>;

    /// Entry names of a directory, sorted
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, SystemError>;

    /// Whether the path exists (file, directory or link)
    async fn exists(&self, path: &str) -> bool;

    /// Final component of a symlink target (e.g. a bound driver name)
    async fn link_target_name(&self, path: &str) -> Result<String, SystemError>;
}
