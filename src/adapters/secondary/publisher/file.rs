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

//! File-based publisher for saving rendered reports to local files

use crate::domain::PublishError;
use crate::ports::DataPublisher;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Writes the rendered report to one file, creating parent directories
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataPublisher for FilePublisher {
    async fn publish(&self, rendered: &str) -> Result<(), PublishError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                PublishError::WriteFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        fs::write(&self.path, rendered).await.map_err(|e| {
            PublishError::WriteFailed(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
