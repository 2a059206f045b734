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

//! Standard output publisher

use crate::domain::PublishError;
use crate::ports::DataPublisher;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Writes the rendered report to stdout; diagnostics stay on stderr
#[derive(Debug, Default)]
pub struct StdoutPublisher;

#[async_trait]
impl DataPublisher for StdoutPublisher {
    async fn publish(&self, rendered: &str) -> Result<(), PublishError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| PublishError::WriteFailed(format!("stdout: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| PublishError::WriteFailed(format!("stdout: {e}")))
    }
}
