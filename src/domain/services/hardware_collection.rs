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

use crate::domain::collectors::{
    run_collector, CollectionContext, CpuCollector, InterconnectCollector, MemoryCollector,
    PciCollector, RaidCollector, StorageCollector, SystemCollector,
};
use crate::domain::{
    CanonicalDocument, Capabilities, CapabilityDetector, DegradeKind, DomainError, ReportConfig,
    ReportError, StorageReport, Warning,
};
use crate::ports::{CommandExecutor, HardwareReportingService, HostFilesystem};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

/// Result of one completed run
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub document: CanonicalDocument,
    /// Every degrade-to-unknown outcome, in section order
    pub warnings: Vec<Warning>,
    pub capabilities: Capabilities,
}

/// Domain service that implements hardware inventory collection
///
/// Detects capabilities once, runs every section collector concurrently and
/// merges their typed outputs into one [`CanonicalDocument`].
pub struct HardwareCollectionService {
    /// Command executor (real processes or scripted)
    executor: Arc<dyn CommandExecutor>,
    /// Host sysfs/procfs reader
    filesystem: Arc<dyn HostFilesystem>,
    /// Executor and filesystem both describe the running machine
    live_host: bool,
}

impl HardwareCollectionService {
    /// Create a new hardware collection service
    ///
    /// # Arguments
    /// * `executor` - Executor for external diagnostic tools
    /// * `filesystem` - Reader for the host's sysfs and procfs trees
    pub fn new(executor: Arc<dyn CommandExecutor>, filesystem: Arc<dyn HostFilesystem>) -> Self {
        Self {
            executor,
            filesystem,
            live_host: false,
        }
    }

    /// Allow in-process fallbacks that read the running machine
    pub fn with_live_host(mut self, live_host: bool) -> Self {
        self.live_host = live_host;
        self
    }

    fn timeout(config: &ReportConfig) -> Duration {
        Duration::from_secs(config.command_timeout_secs.max(1))
    }

    async fn detect(&self, config: &ReportConfig) -> Capabilities {
        CapabilityDetector::new(self.executor.clone(), Self::timeout(config))
            .detect(config)
            .await
    }

    /// Run every collector and assemble the document
    async fn collect(&self, config: &ReportConfig, capabilities: Capabilities) -> CollectionOutcome {
        let mut warnings: Vec<Warning> = capabilities
            .missing_required()
            .into_iter()
            .map(|tool| {
                let warning = Warning::new(
                    "capabilities",
                    DegradeKind::ToolMissing,
                    format!("required tool {tool} is not installed"),
                );
                warn!("{warning}");
                warning
            })
            .collect();

        let ctx = CollectionContext::new(
            self.executor.clone(),
            self.filesystem.clone(),
            capabilities.clone(),
            Self::timeout(config),
        )
        .with_live_host(self.live_host);

        let (system, cpu, memory, disks, raid, pci, interconnects) = tokio::join!(
            run_collector(&SystemCollector, &ctx),
            run_collector(&CpuCollector, &ctx),
            run_collector(&MemoryCollector, &ctx),
            run_collector(&StorageCollector, &ctx),
            run_collector(&RaidCollector, &ctx),
            run_collector(&PciCollector, &ctx),
            run_collector(&InterconnectCollector, &ctx),
        );

        warnings.extend(system.warnings);
        warnings.extend(cpu.warnings);
        warnings.extend(memory.warnings);
        warnings.extend(disks.warnings);
        warnings.extend(raid.warnings);
        warnings.extend(pci.warnings);
        warnings.extend(interconnects.warnings);

        let document = CanonicalDocument {
            system: system.data,
            cpu: cpu.data,
            memory: memory.data,
            storage: StorageReport {
                disks: disks.data,
                raid: raid.data,
            },
            pci: pci.data.devices,
            gpus: pci.data.gpus,
            interconnects: interconnects.data,
        };

        info!(
            "collection finished with {} warning(s)",
            warnings.len()
        );
        CollectionOutcome {
            document,
            warnings,
            capabilities,
        }
    }
}

#[async_trait]
impl HardwareReportingService for HardwareCollectionService {
    async fn generate_report(
        &self,
        config: ReportConfig,
    ) -> Result<CollectionOutcome, ReportError> {
        self.generate_report_cancellable(config, CancellationToken::new())
            .await
    }

    async fn generate_report_cancellable(
        &self,
        config: ReportConfig,
        cancel: CancellationToken,
    ) -> Result<CollectionOutcome, ReportError> {
        let run = async {
            let capabilities = self.detect(&config).await;
            if config.strict {
                capabilities.check_strict()?;
            }
            Ok::<_, ReportError>(self.collect(&config, capabilities).await)
        };

        // Dropping `run` drops every in-flight child process with it
        tokio::select! {
            outcome = run => outcome,
            _ = cancel.cancelled() => {
                warn!("collection cancelled, discarding partial results");
                Err(DomainError::Cancelled.into())
            }
        }
    }

    async fn detect_capabilities(
        &self,
        config: &ReportConfig,
    ) -> Result<Capabilities, ReportError> {
        Ok(self.detect(config).await)
    }
}
