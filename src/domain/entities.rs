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

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Value held by any field whose source could not be determined
pub const UNKNOWN: &str = "unknown";

/// GPU serial marker when no vendor management tool answered
pub const SERIAL_REQUIRES_VENDOR_TOOL: &str = "not obtainable without vendor tool";

/// Reported by the RAID collector when neither software nor hardware RAID exists
pub const NO_RAID_DETECTED: &str = "no RAID detected";

pub fn unknown() -> String {
    UNKNOWN.to_string()
}

pub fn is_unknown(value: &str) -> bool {
    value == UNKNOWN
}

/// System identification from the DMI tables
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SystemIdentity {
    pub vendor: String,
    pub product: String,
    pub serial: String,
    pub uuid: String,
    pub bios: BiosInfo,
}

/// BIOS/Firmware information
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BiosInfo {
    pub vendor: String,
    pub version: String,
    pub date: String,
}

impl Default for BiosInfo {
    fn default() -> Self {
        Self {
            vendor: unknown(),
            version: unknown(),
            date: unknown(),
        }
    }
}

impl Default for SystemIdentity {
    fn default() -> Self {
        Self {
            vendor: unknown(),
            product: unknown(),
            serial: unknown(),
            uuid: unknown(),
            bios: BiosInfo::default(),
        }
    }
}

/// CPU topology as reported by lscpu
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CpuProfile {
    pub architecture: String,
    pub model: String,
    /// Logical CPU count
    pub logical_cpus: String,
    pub cores_per_socket: String,
    pub sockets: String,
    /// Maximum clock, normalized (e.g. "3500 MHz")
    pub max_speed: String,
}

impl Default for CpuProfile {
    fn default() -> Self {
        Self {
            architecture: unknown(),
            model: unknown(),
            logical_cpus: unknown(),
            cores_per_socket: unknown(),
            sockets: unknown(),
            max_speed: unknown(),
        }
    }
}

/// One populated memory slot
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DimmRecord {
    /// Slot label (e.g. "DIMM_A1")
    pub locator: String,
    /// Normalized size (binary prefix, e.g. "16 GiB")
    pub size: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub speed: String,
    pub manufacturer: String,
    pub serial: String,
}

/// Totals derived from the DIMM collection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemorySummary {
    pub total: String,
    pub max_capacity: String,
    pub dominant_type: String,
}

impl Default for MemorySummary {
    fn default() -> Self {
        Self {
            total: unknown(),
            max_capacity: unknown(),
            dominant_type: unknown(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct MemoryReport {
    pub summary: MemorySummary,
    pub dimms: Vec<DimmRecord>,
}

/// One physical block device
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiskRecord {
    pub device: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub capacity: String,
    /// Numeric RPM, "SSD" or unknown
    pub rotation: String,
    pub raid_member: bool,
}

impl DiskRecord {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            model: unknown(),
            serial: unknown(),
            firmware: unknown(),
            capacity: unknown(),
            rotation: unknown(),
            raid_member: false,
        }
    }
}

/// A software (md) array
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RaidArray {
    pub name: String,
    pub level: String,
    pub state: String,
    pub devices: Vec<String>,
    /// Raw `mdadm --detail` output, or unknown
    pub detail: String,
}

/// Best-effort dump from a hardware RAID vendor tool
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HardwareRaidDump {
    pub tool: String,
    pub config: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RaidStatus {
    /// Either a detection summary or NO_RAID_DETECTED
    pub summary: String,
    /// `/proc/mdstat` verbatim, or unknown
    pub mdstat: String,
    pub arrays: Vec<RaidArray>,
    pub hardware: Vec<HardwareRaidDump>,
}

impl Default for RaidStatus {
    fn default() -> Self {
        Self {
            summary: NO_RAID_DETECTED.to_string(),
            mdstat: unknown(),
            arrays: Vec::new(),
            hardware: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct StorageReport {
    pub disks: Vec<DiskRecord>,
    pub raid: RaidStatus,
}

/// Coarse PCI controller class
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PciCategory {
    Graphics,
    Network,
    Storage,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PciDevice {
    /// Full address, e.g. "0000:3b:00.0"
    pub slot: String,
    /// Class text, e.g. "Ethernet controller"
    pub class: String,
    /// Four hex digit class code, or unknown
    pub class_code: String,
    pub description: String,
    pub category: PciCategory,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GpuDevice {
    pub slot: String,
    pub name: String,
    pub uuid: String,
    pub serial: String,
    /// Tool that supplied the identity
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EthernetRole {
    #[serde(rename = "NIC")]
    Nic,
    #[serde(rename = "DPU")]
    Dpu,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetworkInterface {
    pub name: String,
    pub mac: String,
    pub driver: String,
    pub firmware: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EthernetDevice {
    pub slot: String,
    pub description: String,
    pub role: EthernetRole,
    pub interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InfinibandPort {
    pub port: String,
    pub state: String,
    pub physical_state: String,
    pub rate: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InfinibandHca {
    pub name: String,
    pub hca_type: String,
    pub firmware: String,
    pub node_description: String,
    pub ports: Vec<InfinibandPort>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NvLink {
    pub link: String,
    pub peer: String,
    pub bandwidth: String,
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NvSwitch {
    pub index: String,
    pub uuid: String,
    pub family: String,
    pub model: String,
    pub firmware: String,
    pub links: Vec<NvLink>,
}

/// One high-speed interconnect device, tagged by variant
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterconnectDevice {
    Ethernet(EthernetDevice),
    Infiniband(InfinibandHca),
    #[serde(rename = "nvswitch")]
    NvSwitch(NvSwitch),
}

/// The single merged representation for one run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CanonicalDocument {
    pub system: SystemIdentity,
    pub cpu: CpuProfile,
    pub memory: MemoryReport,
    pub storage: StorageReport,
    pub pci: Vec<PciDevice>,
    pub gpus: Vec<GpuDevice>,
    pub interconnects: Vec<InterconnectDevice>,
}

/// Flat namespaced projection: one top-level key per category
#[derive(Debug, Serialize)]
pub struct FlatView<'a> {
    pub system: &'a SystemIdentity,
    pub cpu: &'a CpuProfile,
    pub ram: &'a MemoryReport,
    pub storage: &'a StorageReport,
    pub pci: &'a [PciDevice],
    pub gpus: &'a [GpuDevice],
    pub interconnects: &'a [InterconnectDevice],
}

#[derive(Debug, Serialize)]
pub struct PciTree<'a> {
    pub devices: &'a [PciDevice],
    pub gpus: &'a [GpuDevice],
}

#[derive(Debug, Serialize)]
pub struct HardwareTree<'a> {
    pub system: &'a SystemIdentity,
    pub cpu: &'a CpuProfile,
    pub memory: &'a MemoryReport,
    pub storage: &'a StorageReport,
    pub pci: PciTree<'a>,
}

/// Hierarchical projection: categories under `hardware`, interconnects beside it
#[derive(Debug, Serialize)]
pub struct HierarchicalView<'a> {
    pub hardware: HardwareTree<'a>,
    pub interconnects: &'a [InterconnectDevice],
}

impl CanonicalDocument {
    pub fn flat(&self) -> FlatView<'_> {
        FlatView {
            system: &self.system,
            cpu: &self.cpu,
            ram: &self.memory,
            storage: &self.storage,
            pci: &self.pci,
            gpus: &self.gpus,
            interconnects: &self.interconnects,
        }
    }

    pub fn hierarchical(&self) -> HierarchicalView<'_> {
        HierarchicalView {
            hardware: HardwareTree {
                system: &self.system,
                cpu: &self.cpu,
                memory: &self.memory,
                storage: &self.storage,
                pci: PciTree {
                    devices: &self.pci,
                    gpus: &self.gpus,
                },
            },
            interconnects: &self.interconnects,
        }
    }
}

/// Output shape requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Column-aligned text tables
    #[default]
    Text,
    /// Flat namespaced JSON
    Json,
    /// Hierarchical JSON
    JsonTree,
}

/// Configuration for report generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Treat any missing required tool as fatal before collection starts
    pub strict: bool,
    /// Per external call bound, in seconds
    pub command_timeout_secs: u64,
    /// Tools whose absence fails strict mode
    pub required_tools: Vec<String>,
    /// Root that sysfs/procfs/dev paths are resolved under
    pub host_root: PathBuf,
    /// Allow sudo to prompt once before collection starts
    pub interactive_elevation: bool,
    pub format: OutputFormat,
}

pub const DEFAULT_REQUIRED_TOOLS: &[&str] = &[
    "dmidecode",
    "lscpu",
    "smartctl",
    "udevadm",
    "mdadm",
    "lspci",
    "ethtool",
];

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            strict: false,
            command_timeout_secs: 15,
            required_tools: DEFAULT_REQUIRED_TOOLS
                .iter()
                .map(|tool| tool.to_string())
                .collect(),
            host_root: PathBuf::from("/"),
            interactive_elevation: false,
            format: OutputFormat::Text,
        }
    }
}
