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

//! Interconnect parsing: Ethernet/DPU, InfiniBand sysfs values, NVSwitch CSV

use super::common::{clean_value, extract_field};
use super::pci::pci_ids;
use crate::domain::{unknown, EthernetRole, NvLink, NvSwitch};

/// Plain Ethernet and InfiniBand class codes; any other network class is a DPU
const PLAIN_NETWORK_CLASSES: &[&str] = &["0200", "0207"];

const DPU_KEYWORDS: &[&str] = &[
    "bluefield",
    "dpu",
    "data processing unit",
    "pensando",
    "octeon",
    "infrastructure processing unit",
];

const MELLANOX_VENDOR_ID: &str = "15b3";

/// Decide NIC vs DPU for a network-class PCI function
///
/// A DPU is recognised by a description keyword, by a Mellanox device id in
/// the BlueField ranges (0xa2xx / 0xc2xx), or by a network class code other
/// than plain Ethernet/InfiniBand. `ids` are the sysfs vendor/device ids; when
/// absent they are taken from the lspci description.
pub fn classify_network_function(
    description: &str,
    class_code: &str,
    ids: Option<(String, String)>,
) -> EthernetRole {
    let lowered = description.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let keyword_hit = DPU_KEYWORDS.iter().any(|keyword| {
        if keyword.contains(' ') {
            lowered.contains(keyword)
        } else {
            words.iter().any(|word| word == keyword)
        }
    });

    let bluefield_id = ids.or_else(|| pci_ids(description)).is_some_and(|(vendor, device)| {
        vendor == MELLANOX_VENDOR_ID && (device.starts_with("a2") || device.starts_with("c2"))
    });

    let odd_class = class_code.len() == 4
        && class_code.starts_with("02")
        && !PLAIN_NETWORK_CLASSES.contains(&class_code);

    if keyword_hit || bluefield_id || odd_class {
        EthernetRole::Dpu
    } else {
        EthernetRole::Nic
    }
}

/// Driver and firmware from `ethtool -i <iface>`
pub fn parse_ethtool_driver_info(output: &str) -> (String, String) {
    (
        clean_value(&extract_field(output, "driver")),
        clean_value(&extract_field(output, "firmware-version")),
    )
}

/// Strip the numeric prefix sysfs puts on IB states ("4: ACTIVE" -> "ACTIVE")
pub fn parse_ib_state(content: &str) -> String {
    let value = match content.split_once(':') {
        Some((prefix, rest)) if prefix.trim().chars().all(|c| c.is_ascii_digit()) => rest,
        _ => content,
    };
    clean_value(value)
}

fn csv_fields(line: &str) -> Vec<String> {
    line.split(',').map(clean_value).collect()
}

/// Parse the switch inventory CSV (index, uuid, family, model, firmware)
pub fn parse_nvswitch_inventory(output: &str) -> Vec<NvSwitch> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = csv_fields(line);
            let field = |i: usize| fields.get(i).cloned().unwrap_or_else(unknown);
            if fields.is_empty() || crate::domain::is_unknown(&fields[0]) {
                return None;
            }
            Some(NvSwitch {
                index: field(0),
                uuid: field(1),
                family: field(2),
                model: field(3),
                firmware: field(4),
                links: Vec::new(),
            })
        })
        .collect()
}

/// Parse the link CSV (switch_index, link_id, peer, bandwidth, state)
pub fn parse_nvswitch_links(output: &str) -> Vec<(String, NvLink)> {
    output
        .lines()
        .filter_map(|line| {
            let fields = csv_fields(line);
            if fields.len() < 2 || crate::domain::is_unknown(&fields[0]) {
                return None;
            }
            let field = |i: usize| fields.get(i).cloned().unwrap_or_else(unknown);
            Some((
                field(0),
                NvLink {
                    link: field(1),
                    peer: field(2),
                    bandwidth: field(3),
                    state: field(4),
                },
            ))
        })
        .collect()
}

/// Attach each link to the switch with the same index
///
/// Returns the links whose index matched no switch.
pub fn attach_nvlinks(
    switches: &mut [NvSwitch],
    links: Vec<(String, NvLink)>,
) -> Vec<(String, NvLink)> {
    let mut orphans = Vec::new();
    for (index, link) in links {
        match switches.iter_mut().find(|switch| switch.index == index) {
            Some(switch) => switch.links.push(link),
            None => orphans.push((index, link)),
        }
    }
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN;

    #[test]
    fn test_classify_network_function() {
        assert_eq!(
            classify_network_function(
                "Mellanox Technologies MT2892 Family [ConnectX-6 Dx] [15b3:101d]",
                "0200",
                None
            ),
            EthernetRole::Nic
        );
        assert_eq!(
            classify_network_function(
                "Mellanox Technologies MT42822 BlueField-2 integrated ConnectX-6 Dx network controller [15b3:a2d6]",
                "0200",
                None
            ),
            EthernetRole::Dpu
        );
        assert_eq!(
            classify_network_function("Mellanox Technologies Device [15b3:c2d5]", "0200", None),
            EthernetRole::Dpu
        );
        assert_eq!(
            classify_network_function(
                UNKNOWN,
                "0200",
                Some(("15b3".to_string(), "a2dc".to_string()))
            ),
            EthernetRole::Dpu
        );
        assert_eq!(
            classify_network_function("Pensando Systems DSC Ethernet Controller", "0200", None),
            EthernetRole::Dpu
        );
        assert_eq!(
            classify_network_function(
                "Intel Corporation Infrastructure Data Path Function",
                "0280",
                None
            ),
            EthernetRole::Dpu
        );
        assert_eq!(
            classify_network_function(
                "Mellanox Technologies MT2910 Family [ConnectX-7]",
                "0207",
                None
            ),
            EthernetRole::Nic
        );
        assert_eq!(
            classify_network_function("Intel Corporation Ethernet Controller X710", UNKNOWN, None),
            EthernetRole::Nic
        );
    }

    #[test]
    fn test_parse_ethtool_driver_info() {
        let output = "driver: mlx5_core\nversion: 5.15.0-91-generic\nfirmware-version: 22.36.1010 (MT_0000000359)\nbus-info: 0000:3b:00.0\n";
        let (driver, firmware) = parse_ethtool_driver_info(output);
        assert_eq!(driver, "mlx5_core");
        assert_eq!(firmware, "22.36.1010 (MT_0000000359)");
        assert_eq!(parse_ethtool_driver_info(""), (unknown(), unknown()));
    }

    #[test]
    fn test_parse_ib_state() {
        assert_eq!(parse_ib_state("4: ACTIVE\n"), "ACTIVE");
        assert_eq!(parse_ib_state("5: LinkUp"), "LinkUp");
        assert_eq!(parse_ib_state("400 Gb/sec (4X NDR)\n"), "400 Gb/sec (4X NDR)");
        assert_eq!(parse_ib_state(""), UNKNOWN);
    }

    #[test]
    fn test_nvswitch_links_attach_by_index() {
        let inventory = "0, 4b0a8b9e-aaaa, LS10, NVSwitch 4, 96.10.6D.00.01\n1, 6f1e2d3c-bbbb, LS10, NVSwitch 4, 96.10.6D.00.01\n";
        let links = "1, 0, GPU 0000:18:00.0, 53.125 GB/s, Active\n0, 3, GPU 0000:2a:00.0, 53.125 GB/s, Active\n7, 1, GPU 0000:3a:00.0, 53.125 GB/s, Inactive\n";

        let mut switches = parse_nvswitch_inventory(inventory);
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[0].family, "LS10");

        let orphans = attach_nvlinks(&mut switches, parse_nvswitch_links(links));
        assert_eq!(switches[0].links.len(), 1);
        assert_eq!(switches[0].links[0].link, "3");
        assert_eq!(switches[1].links[0].peer, "GPU 0000:18:00.0");
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].0, "7");
    }
}
