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

//! Interconnect topology: Ethernet/DPU, InfiniBand and NVSwitch sub-walks

use super::{run_collector, CollectionContext, Collector, Requirement, SectionLog};
use crate::domain::parsers::{
    attach_nvlinks, classify_network_function, clean_value, parse_ethtool_driver_info,
    parse_ib_state, parse_lspci_output, parse_nvswitch_inventory, parse_nvswitch_links,
};
use crate::domain::{
    is_unknown, unknown, DegradeKind, EthernetDevice, InfinibandHca, InfinibandPort,
    InterconnectDevice, NetworkInterface, NvSwitch,
};
use async_trait::async_trait;
use std::collections::HashMap;

const PCI_DEVICES: &str = "/sys/bus/pci/devices";
const INFINIBAND_CLASS: &str = "/sys/class/infiniband";

const NVSWITCH_INVENTORY_QUERY: &str = "--query-switch=index,uuid,family,model,firmware";
const NVSWITCH_LINK_QUERY: &str = "--query-link=switch_index,link_id,peer,bandwidth,state";

/// Read a sysfs attribute and map placeholders to unknown
async fn attribute(ctx: &CollectionContext, path: &str) -> String {
    ctx.read(path)
        .await
        .map(|content| clean_value(&content))
        .unwrap_or_else(unknown)
}

/// `0x020000` -> `0200`
fn class_code(raw: &str) -> Option<String> {
    let code = raw.trim().trim_start_matches("0x").get(..4)?;
    code.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| code.to_lowercase())
}

fn strip_hex_prefix(raw: &str) -> String {
    raw.trim().trim_start_matches("0x").to_lowercase()
}

/// PCI network functions, classified as NIC or DPU, with their interfaces
pub struct EthernetCollector;

impl EthernetCollector {
    /// lspci descriptions keyed by slot, empty when lspci is unavailable
    async fn descriptions(ctx: &CollectionContext) -> HashMap<String, String> {
        match ctx.run("lspci", &["-Dnn"]).await {
            Ok(output) => parse_lspci_output(&output)
                .into_iter()
                .map(|device| (device.slot, device.description))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }

    async fn interface(
        ctx: &CollectionContext,
        log: &mut SectionLog,
        device_path: &str,
        name: &str,
    ) -> NetworkInterface {
        let mut interface = NetworkInterface {
            name: name.to_string(),
            mac: attribute(ctx, &format!("{device_path}/net/{name}/address")).await,
            driver: ctx
                .link_name(&format!("{device_path}/driver"))
                .await
                .unwrap_or_else(unknown),
            firmware: unknown(),
        };

        if ctx.has_tool("ethtool") {
            match ctx.run("ethtool", &["-i", name]).await {
                Ok(output) => {
                    let (driver, firmware) = parse_ethtool_driver_info(&output);
                    if is_unknown(&interface.driver) {
                        interface.driver = driver;
                    }
                    interface.firmware = firmware;
                }
                Err(e) => log.command_failed(&format!("ethtool -i {name}"), &e),
            }
        }

        if is_unknown(&interface.firmware) {
            // Mellanox functions expose the firmware through their RDMA device
            for hca in ctx.list(&format!("{device_path}/infiniband")).await {
                let firmware =
                    attribute(ctx, &format!("{device_path}/infiniband/{hca}/fw_ver")).await;
                if !is_unknown(&firmware) {
                    interface.firmware = firmware;
                    break;
                }
            }
        }
        interface
    }
}

#[async_trait]
impl Collector for EthernetCollector {
    type Output = Vec<EthernetDevice>;

    fn section(&self) -> &'static str {
        "ethernet"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> Vec<EthernetDevice> {
        let slots = ctx.list(PCI_DEVICES).await;
        if slots.is_empty() {
            log.degrade(DegradeKind::ToolMissing, format!("{PCI_DEVICES} is not available"));
            return Vec::new();
        }
        if !ctx.has_tool("ethtool") {
            log.degrade(DegradeKind::ToolMissing, "ethtool is not installed");
        }

        let descriptions = Self::descriptions(ctx).await;
        let mut devices = Vec::new();

        for slot in slots {
            let device_path = format!("{PCI_DEVICES}/{slot}");
            let Some(code) = ctx
                .read(&format!("{device_path}/class"))
                .await
                .and_then(|raw| class_code(&raw))
            else {
                continue;
            };
            if !code.starts_with("02") {
                continue;
            }

            let vendor = ctx.read(&format!("{device_path}/vendor")).await;
            let device = ctx.read(&format!("{device_path}/device")).await;
            let ids = vendor
                .zip(device)
                .map(|(vendor, device)| (strip_hex_prefix(&vendor), strip_hex_prefix(&device)));
            let description = descriptions.get(&slot).cloned().unwrap_or_else(unknown);

            let mut interfaces = Vec::new();
            for name in ctx.list(&format!("{device_path}/net")).await {
                interfaces.push(Self::interface(ctx, log, &device_path, &name).await);
            }

            devices.push(EthernetDevice {
                role: classify_network_function(&description, &code, ids),
                slot,
                description,
                interfaces,
            });
        }
        devices
    }
}

/// HCAs under /sys/class/infiniband with their ports nested
pub struct InfinibandCollector;

#[async_trait]
impl Collector for InfinibandCollector {
    type Output = Vec<InfinibandHca>;

    fn section(&self) -> &'static str {
        "infiniband"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> Vec<InfinibandHca> {
        if !ctx.exists(INFINIBAND_CLASS).await {
            log.degrade(
                DegradeKind::ToolMissing,
                format!("{INFINIBAND_CLASS} is not available"),
            );
            return Vec::new();
        }

        let mut hcas = Vec::new();
        for name in ctx.list(INFINIBAND_CLASS).await {
            let base = format!("{INFINIBAND_CLASS}/{name}");
            let mut ports = Vec::new();
            for port in ctx.list(&format!("{base}/ports")).await {
                let port_path = format!("{base}/ports/{port}");
                ports.push(InfinibandPort {
                    state: parse_ib_state(&attribute(ctx, &format!("{port_path}/state")).await),
                    physical_state: parse_ib_state(
                        &attribute(ctx, &format!("{port_path}/phys_state")).await,
                    ),
                    rate: attribute(ctx, &format!("{port_path}/rate")).await,
                    port,
                });
            }

            hcas.push(InfinibandHca {
                hca_type: attribute(ctx, &format!("{base}/hca_type")).await,
                firmware: attribute(ctx, &format!("{base}/fw_ver")).await,
                node_description: attribute(ctx, &format!("{base}/node_desc")).await,
                name,
                ports,
            });
        }
        hcas
    }
}

/// NVSwitch inventory with links attached by switch index
pub struct NvSwitchCollector;

#[async_trait]
impl Collector for NvSwitchCollector {
    type Output = Vec<NvSwitch>;

    fn section(&self) -> &'static str {
        "nvswitch"
    }

    fn requirements(&self) -> Vec<Requirement> {
        vec![Requirement::Tool("nvidia-smi"), Requirement::NvSwitchQuery]
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> Vec<NvSwitch> {
        let mut switches = match ctx
            .run(
                "nvidia-smi",
                &["nvswitch", NVSWITCH_INVENTORY_QUERY, "--format=csv,noheader"],
            )
            .await
        {
            Ok(output) => parse_nvswitch_inventory(&output),
            Err(e) => {
                log.command_failed("nvswitch inventory", &e);
                return Vec::new();
            }
        };
        if switches.is_empty() {
            return switches;
        }

        match ctx
            .run(
                "nvidia-smi",
                &["nvswitch", NVSWITCH_LINK_QUERY, "--format=csv,noheader"],
            )
            .await
        {
            Ok(output) => {
                let orphans = attach_nvlinks(&mut switches, parse_nvswitch_links(&output));
                for (index, link) in orphans {
                    log.parse_miss(
                        "nvlink",
                        &format!("link {} names unknown switch {index}", link.link),
                    );
                }
            }
            Err(e) => log.command_failed("nvswitch links", &e),
        }
        switches
    }
}

/// Runs the three sub-walks concurrently; none can fail the others
pub struct InterconnectCollector;

#[async_trait]
impl Collector for InterconnectCollector {
    type Output = Vec<InterconnectDevice>;

    fn section(&self) -> &'static str {
        "interconnects"
    }

    async fn collect(
        &self,
        ctx: &CollectionContext,
        log: &mut SectionLog,
    ) -> Vec<InterconnectDevice> {
        let (ethernet, infiniband, nvswitch) = tokio::join!(
            run_collector(&EthernetCollector, ctx),
            run_collector(&InfinibandCollector, ctx),
            run_collector(&NvSwitchCollector, ctx),
        );

        let mut devices = Vec::new();
        devices.extend(ethernet.data.into_iter().map(InterconnectDevice::Ethernet));
        devices.extend(infiniband.data.into_iter().map(InterconnectDevice::Infiniband));
        devices.extend(nvswitch.data.into_iter().map(InterconnectDevice::NvSwitch));

        log.absorb(ethernet.warnings);
        log.absorb(infiniband.warnings);
        log.absorb(nvswitch.warnings);
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, write};
    use super::*;
    use crate::adapters::SimulatedCommandExecutor;
    use crate::domain::EthernetRole;
    use std::path::Path;

    #[test]
    fn test_class_code_tolerates_malformed_sysfs() {
        assert_eq!(class_code("0x020000\n"), Some("0200".to_string()));
        assert_eq!(class_code("0x02"), None);
        assert_eq!(class_code("0x000é00"), None);
        assert_eq!(class_code("éééé"), None);
        assert_eq!(class_code(""), None);
    }

    fn pci_function(root: &Path, slot: &str, class: &str, vendor: &str, device: &str) {
        let base = format!("/sys/bus/pci/devices/{slot}");
        write(root, &format!("{base}/class"), class);
        write(root, &format!("{base}/vendor"), vendor);
        write(root, &format!("{base}/device"), device);
    }

    #[tokio::test]
    async fn test_ethernet_walk_classifies_and_attaches_interfaces() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        pci_function(root, "0000:1a:00.0", "0x020000\n", "0x15b3\n", "0x101d\n");
        write(
            root,
            "/sys/bus/pci/devices/0000:1a:00.0/net/ens1f0np0/address",
            "b8:3f:d2:aa:bb:cc\n",
        );
        pci_function(root, "0000:2b:00.0", "0x020000\n", "0x15b3\n", "0xa2dc\n");
        write(
            root,
            "/sys/bus/pci/devices/0000:2b:00.0/infiniband/mlx5_2/fw_ver",
            "24.35.2000\n",
        );
        write(
            root,
            "/sys/bus/pci/devices/0000:2b:00.0/net/p0/address",
            "08:c0:eb:00:11:22\n",
        );
        pci_function(root, "0000:00:14.0", "0x0c0330\n", "0x8086\n", "0x7ae0\n");

        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["ethtool"])
            .with_output(
                "ethtool -i ens1f0np0",
                "driver: mlx5_core\nversion: 5.15.0\nfirmware-version: 22.36.1010 (MT_0000000359)\n",
            );
        let ctx = context(executor, root).await;

        let section = run_collector(&EthernetCollector, &ctx).await;
        let devices = section.data;
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].slot, "0000:1a:00.0");
        assert_eq!(devices[0].role, EthernetRole::Nic);
        assert_eq!(devices[0].interfaces[0].mac, "b8:3f:d2:aa:bb:cc");
        assert_eq!(devices[0].interfaces[0].driver, "mlx5_core");
        assert_eq!(
            devices[0].interfaces[0].firmware,
            "22.36.1010 (MT_0000000359)"
        );

        assert_eq!(devices[1].role, EthernetRole::Dpu);
        assert_eq!(devices[1].interfaces[0].firmware, "24.35.2000");
        // ethtool had no script for p0
        assert_eq!(section.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_infiniband_ports_nest_under_hca() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let base = "/sys/class/infiniband/mlx5_0";
        write(root, &format!("{base}/fw_ver"), "28.39.1002\n");
        write(root, &format!("{base}/hca_type"), "MT4129\n");
        write(root, &format!("{base}/node_desc"), "gpu-node-01 HCA-1\n");
        write(root, &format!("{base}/ports/1/state"), "4: ACTIVE\n");
        write(root, &format!("{base}/ports/1/phys_state"), "5: LinkUp\n");
        write(root, &format!("{base}/ports/1/rate"), "400 Gb/sec (4X NDR)\n");
        let ctx = context(SimulatedCommandExecutor::new(), root).await;

        let hcas = run_collector(&InfinibandCollector, &ctx).await.data;
        assert_eq!(hcas.len(), 1);
        assert_eq!(hcas[0].firmware, "28.39.1002");
        assert_eq!(hcas[0].node_description, "gpu-node-01 HCA-1");
        assert_eq!(hcas[0].ports[0].port, "1");
        assert_eq!(hcas[0].ports[0].state, "ACTIVE");
        assert_eq!(hcas[0].ports[0].physical_state, "LinkUp");
        assert_eq!(hcas[0].ports[0].rate, "400 Gb/sec (4X NDR)");
    }

    #[tokio::test]
    async fn test_nvswitch_links_attach_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["nvidia-smi"])
            .with_output("nvidia-smi nvswitch --help", "usage")
            .with_output(
                "nvidia-smi nvswitch --query-switch=index,uuid,family,model,firmware --format=csv,noheader",
                "0, SW-1111, LS10, NVSwitch, 96.10.3F\n1, SW-2222, LS10, NVSwitch, 96.10.3F\n",
            )
            .with_output(
                "nvidia-smi nvswitch --query-link=switch_index,link_id,peer,bandwidth,state --format=csv,noheader",
                "1, 0, GPU-5d3f, 50 GB/s, Active\n0, 3, GPU-77aa, 50 GB/s, Active\n7, 1, GPU-0000, 50 GB/s, Down\n",
            );
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&NvSwitchCollector, &ctx).await;
        assert_eq!(section.data.len(), 2);
        assert_eq!(section.data[0].links[0].link, "3");
        assert_eq!(section.data[1].links[0].peer, "GPU-5d3f");
        assert_eq!(section.warnings.len(), 1);
        assert_eq!(section.warnings[0].kind, DegradeKind::ParseMiss);
    }

    #[tokio::test]
    async fn test_sub_walks_degrade_independently() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "/sys/class/infiniband/mlx5_0/fw_ver",
            "28.39.1002\n",
        );
        let ctx = context(SimulatedCommandExecutor::new(), dir.path()).await;

        let section = run_collector(&InterconnectCollector, &ctx).await;
        assert_eq!(section.data.len(), 1);
        assert!(matches!(section.data[0], InterconnectDevice::Infiniband(_)));

        let sections: Vec<&str> = section.warnings.iter().map(|w| w.section.as_str()).collect();
        assert!(sections.contains(&"ethernet"));
        assert!(sections.contains(&"nvswitch"));
        assert!(!sections.contains(&"infiniband"));
    }
}
