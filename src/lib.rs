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

//! Hardware Inventory Library
//!
//! Inventories a Linux host (system/BIOS identity, CPU topology, DIMMs, disks
//! and RAID state, PCI devices and GPUs, Ethernet/DPU, InfiniBand and NVSwitch
//! topology) by querying external diagnostic tools and sysfs, and normalizes
//! the results into one [`CanonicalDocument`]. Missing tools or privilege
//! degrade individual fields to `"unknown"`; they never abort a run.
//!
//! # Architecture
//!
//! - **Domain**: entities, parsers, collectors and the collection service
//! - **Ports**: interfaces for command execution, host filesystem, config and output
//! - **Adapters**: process executor, scripted executor, rooted filesystem, publishers
//!
//! # Usage
//!
//! ```rust,no_run
//! use hardware_inventory::{render, OutputFormat, ReportConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = hardware_inventory::create_service()?;
//!
//!     let outcome = service.generate_report(ReportConfig::default()).await?;
//!     for warning in &outcome.warnings {
//!         eprintln!("{warning}");
//!     }
//!     print!("{}", render(&outcome.document, OutputFormat::Json)?);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod container;
pub mod domain;
pub mod ports;

pub use adapters::{
    FilePublisher, RootedFilesystem, SimulatedCommandExecutor, StdoutPublisher,
    TomlConfigProvider, UnixCommandExecutor,
};
pub use container::{ContainerConfig, ContainerConfigBuilder, ServiceContainer};
pub use domain::{
    render, CancellationToken, CanonicalDocument, Capabilities,
    CollectionOutcome, DegradeKind, DomainError, OutputFormat, PrivilegeMode, PublishError,
    ReportConfig, ReportError, Warning,
};
pub use ports::{
    CommandExecutor, ConfigurationProvider, DataPublisher, HardwareReportingService,
    HostFilesystem,
};

use std::error::Error;
use std::sync::Arc;

/// Service wired to the live host with default settings
pub fn create_service() -> Result<Arc<dyn HardwareReportingService>, Box<dyn Error>> {
    ServiceContainer::new(ContainerConfig::default()).create_hardware_reporting_service()
}
