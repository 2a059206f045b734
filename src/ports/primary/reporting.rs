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

use crate::domain::{
    Capabilities, CancellationToken, CollectionOutcome, ReportConfig, ReportError,
};
use async_trait::async_trait;

/// Primary port - Main interface offered by the hardware inventory domain
///
/// This is what external systems (CLI, library consumers) use to interact
/// with the inventory functionality.
#[async_trait]
pub trait HardwareReportingService: Send + Sync {
    /// Collect every section and assemble the canonical document
    ///
    /// # Arguments
    /// * `config` - Configuration options for report generation
    ///
    /// # Returns
    /// * `Ok(CollectionOutcome)` - Document plus degrade warnings
    /// * `Err(ReportError)` - Strict-mode failure or unrecoverable error
    async fn generate_report(&self, config: ReportConfig)
        -> Result<CollectionOutcome, ReportError>;

    /// Same as `generate_report`, abandoning the run when `cancel` fires
    ///
    /// A cancelled run yields `ReportError` and no partial document.
    async fn generate_report_cancellable(
        &self,
        config: ReportConfig,
        cancel: CancellationToken,
    ) -> Result<CollectionOutcome, ReportError>;

    /// Detect tools and privilege without collecting anything
    async fn detect_capabilities(&self, config: &ReportConfig)
        -> Result<Capabilities, ReportError>;
}
