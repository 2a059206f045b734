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

//! PCI/GPU collector

use super::{CollectionContext, Collector, SectionLog};
use crate::domain::parsers::{parse_lspci_output, parse_nvidia_smi_gpus};
use crate::domain::{unknown, GpuDevice, PciCategory, PciDevice, SERIAL_REQUIRES_VENDOR_TOOL};
use async_trait::async_trait;

const GPU_QUERY: &str = "--query-gpu=name,uuid,pci.bus_id,serial";

/// Every PCI function plus the GPU list derived from the best source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PciInventory {
    pub devices: Vec<PciDevice>,
    pub gpus: Vec<GpuDevice>,
}

pub struct PciCollector;

/// GPUs as lspci sees them; serials need the vendor tool
fn gpus_from_pci(devices: &[PciDevice]) -> Vec<GpuDevice> {
    devices
        .iter()
        .filter(|device| device.category == PciCategory::Graphics)
        .map(|device| GpuDevice {
            slot: device.slot.clone(),
            name: device.description.clone(),
            uuid: unknown(),
            serial: SERIAL_REQUIRES_VENDOR_TOOL.to_string(),
            source: "lspci".to_string(),
        })
        .collect()
}

impl PciCollector {
    async fn vendor_gpus(ctx: &CollectionContext, log: &mut SectionLog) -> Option<Vec<GpuDevice>> {
        if !ctx.has_tool("nvidia-smi") {
            return None;
        }
        match ctx
            .run("nvidia-smi", &[GPU_QUERY, "--format=csv,noheader"])
            .await
        {
            Ok(output) => {
                let gpus = parse_nvidia_smi_gpus(&output);
                if gpus.is_empty() {
                    log.parse_miss("gpus", "nvidia-smi listed no GPUs");
                    None
                } else {
                    Some(gpus)
                }
            }
            Err(e) => {
                log.command_failed("nvidia-smi GPU query", &e);
                None
            }
        }
    }
}

#[async_trait]
impl Collector for PciCollector {
    type Output = PciInventory;

    fn section(&self) -> &'static str {
        "pci"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> PciInventory {
        let mut devices = match ctx.run("lspci", &["-Dnn"]).await {
            Ok(output) => parse_lspci_output(&output),
            Err(e) => {
                log.command_failed("lspci", &e);
                Vec::new()
            }
        };
        devices.sort_by(|a, b| a.slot.cmp(&b.slot));

        let mut gpus = match Self::vendor_gpus(ctx, log).await {
            Some(mut gpus) => {
                // Display controllers the vendor tool does not manage (BMC VGA etc.)
                let extra: Vec<GpuDevice> = gpus_from_pci(&devices)
                    .into_iter()
                    .filter(|pci| !gpus.iter().any(|gpu| gpu.slot == pci.slot))
                    .collect();
                gpus.extend(extra);
                gpus
            }
            None => gpus_from_pci(&devices),
        };
        gpus.sort_by(|a, b| a.slot.cmp(&b.slot));

        PciInventory { devices, gpus }
    }
}
