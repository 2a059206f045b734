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

//! PCI and GPU parsing functions

use super::common::clean_value;
use crate::domain::{unknown, GpuDevice, PciCategory, PciDevice};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LSPCI_NN_RE: Regex =
        Regex::new(r"^(\S+)\s+(.+?)\s+\[([0-9a-fA-F]{4})\]:\s+(.*)$").unwrap();
    static ref LSPCI_RE: Regex = Regex::new(r"^(\S+)\s+([^:]+):\s+(.*)$").unwrap();
    static ref PCI_IDS_RE: Regex = Regex::new(r"\[([0-9a-fA-F]{4}):([0-9a-fA-F]{4})\]").unwrap();
    static ref REVISION_RE: Regex = Regex::new(r"\s*\(rev [0-9a-fA-F]+\)\s*$").unwrap();
}

const GRAPHICS_KEYWORDS: &[&str] = &["vga compatible", "3d controller", "display controller"];
const NETWORK_KEYWORDS: &[&str] = &[
    "ethernet controller",
    "network controller",
    "infiniband controller",
];
const STORAGE_KEYWORDS: &[&str] = &[
    "raid bus controller",
    "sata controller",
    "serial attached scsi",
    "scsi storage controller",
    "non-volatile memory controller",
    "mass storage controller",
];

/// Classify a PCI function from its class text and code
pub fn classify_pci_class(class: &str, class_code: &str) -> PciCategory {
    let class = class.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| class.contains(k));

    if matches(GRAPHICS_KEYWORDS) || class_code.starts_with("03") {
        PciCategory::Graphics
    } else if matches(NETWORK_KEYWORDS) || class_code.starts_with("02") {
        PciCategory::Network
    } else if matches(STORAGE_KEYWORDS) || class_code.starts_with("01") {
        PciCategory::Storage
    } else {
        PciCategory::Other
    }
}

/// Parse `lspci -Dnn` output (plain `lspci -D` lines are accepted too)
pub fn parse_lspci_output(lspci_output: &str) -> Vec<PciDevice> {
    lspci_output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (slot, class, class_code, description) =
                if let Some(captures) = LSPCI_NN_RE.captures(line) {
                    (
                        captures[1].to_string(),
                        captures[2].to_string(),
                        captures[3].to_lowercase(),
                        captures[4].to_string(),
                    )
                } else {
                    let captures = LSPCI_RE.captures(line)?;
                    (
                        captures[1].to_string(),
                        captures[2].to_string(),
                        unknown(),
                        captures[3].to_string(),
                    )
                };

            let description = REVISION_RE.replace(&description, "").to_string();
            Some(PciDevice {
                category: classify_pci_class(&class, &class_code),
                slot: normalize_pci_address(&slot),
                class: class.trim().to_string(),
                class_code,
                description: description.trim().to_string(),
            })
        })
        .collect()
}

/// `[vendor:device]` ids from an lspci -nn description
pub fn pci_ids(description: &str) -> Option<(String, String)> {
    PCI_IDS_RE
        .captures_iter(description)
        .last()
        .map(|captures| (captures[1].to_lowercase(), captures[2].to_lowercase()))
}

/// Normalize "00000000:18:00.0" (nvidia-smi) and "0000:18:00.0" (lspci) to one form
pub fn normalize_pci_address(address: &str) -> String {
    let address = address.trim().to_lowercase();
    match address.split_once(':') {
        Some((domain, rest)) if rest.contains(':') => {
            let domain = domain.trim_start_matches('0');
            format!("{:0>4}:{}", domain, rest)
        }
        // lspci without -D omits the domain
        _ if address.contains(':') => format!("0000:{}", address),
        _ => address,
    }
}

/// Parse `nvidia-smi --query-gpu=name,uuid,pci.bus_id,serial --format=csv,noheader`
pub fn parse_nvidia_smi_gpus(output: &str) -> Vec<GpuDevice> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if parts.len() < 3 || parts[0].is_empty() {
                return None;
            }
            Some(GpuDevice {
                slot: normalize_pci_address(parts[2]),
                name: clean_value(parts[0]),
                uuid: clean_value(parts[1]),
                serial: parts
                    .get(3)
                    .map(|serial| clean_value(serial))
                    .unwrap_or_else(unknown),
                source: "nvidia-smi".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN;

    const LSPCI: &str = r#"0000:00:00.0 Host bridge [0600]: Intel Corporation Sky Lake-E DMI3 Registers [8086:2020] (rev 07)
0000:18:00.0 3D controller [0302]: NVIDIA Corporation GH100 [H100 SXM5 80GB] [10de:2330] (rev a1)
0000:3b:00.0 Ethernet controller [0200]: Mellanox Technologies MT2892 Family [ConnectX-6 Dx] [15b3:101d]
0000:5e:00.0 Non-Volatile memory controller [0108]: Samsung Electronics Co Ltd NVMe SSD Controller PM173X [144d:a824]
0000:af:00.0 Infiniband controller [0207]: Mellanox Technologies MT2910 Family [ConnectX-7] [15b3:1021]
"#;

    #[test]
    fn test_parse_lspci_output() {
        let devices = parse_lspci_output(LSPCI);
        assert_eq!(devices.len(), 5);

        assert_eq!(devices[0].category, PciCategory::Other);
        assert_eq!(devices[1].slot, "0000:18:00.0");
        assert_eq!(devices[1].class, "3D controller");
        assert_eq!(devices[1].class_code, "0302");
        assert_eq!(devices[1].category, PciCategory::Graphics);
        assert!(!devices[1].description.contains("(rev"));
        assert_eq!(devices[2].category, PciCategory::Network);
        assert_eq!(devices[3].category, PciCategory::Storage);
        assert_eq!(devices[4].category, PciCategory::Network);
    }

    #[test]
    fn test_parse_lspci_without_class_codes() {
        let devices = parse_lspci_output("00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 630\n");
        assert_eq!(devices[0].slot, "0000:00:02.0");
        assert_eq!(devices[0].class_code, UNKNOWN);
        assert_eq!(devices[0].category, PciCategory::Graphics);
    }

    #[test]
    fn test_pci_ids() {
        assert_eq!(
            pci_ids("Mellanox Technologies MT42822 BlueField-2 [15b3:a2d6]"),
            Some(("15b3".to_string(), "a2d6".to_string()))
        );
        assert_eq!(pci_ids("no ids"), None);
    }

    #[test]
    fn test_normalize_pci_address() {
        assert_eq!(normalize_pci_address("00000000:18:00.0"), "0000:18:00.0");
        assert_eq!(normalize_pci_address("0000:3B:00.0"), "0000:3b:00.0");
        assert_eq!(normalize_pci_address("18:00.0"), "0000:18:00.0");
    }

    #[test]
    fn test_parse_nvidia_smi_gpus() {
        let output = "NVIDIA H100 80GB HBM3, GPU-5c7b2a3e-1111-2222-3333-444455556666, 00000000:18:00.0, 1654922007629\nNVIDIA H100 80GB HBM3, GPU-aaaa, 00000000:2A:00.0, [N/A]\n";
        let gpus = parse_nvidia_smi_gpus(output);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].slot, "0000:18:00.0");
        assert_eq!(gpus[0].serial, "1654922007629");
        assert_eq!(gpus[1].slot, "0000:2a:00.0");
        assert_eq!(gpus[1].serial, UNKNOWN);
        assert!(parse_nvidia_smi_gpus("").is_empty());
    }
}
