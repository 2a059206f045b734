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

//! Storage information parsing functions

use super::common::{bytes_to_human_readable, clean_value, extract_field, extract_field_matching};
use crate::domain::{is_unknown, unknown};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PHYSICAL_DISK_RE: Regex =
        Regex::new(r"^(sd[a-z]+|hd[a-z]+|vd[a-z]+|xvd[a-z]+|nvme\d+n\d+|mmcblk\d+)$").unwrap();
    static ref CAPACITY_BYTES_RE: Regex = Regex::new(
        r"(?i)^\s*(?:User Capacity|Total NVM Capacity|Namespace 1 Size/Capacity)\s*:\s*([\d,]+)"
    )
    .unwrap();
    static ref RPM_RE: Regex = Regex::new(r"(?i)^(\d+)(?:\s*rpm)?$").unwrap();
}

/// SSD marker used wherever a rotation rate is reported
pub const SOLID_STATE: &str = "SSD";

/// Check if a /sys/block entry is a physical disk
///
/// Partitions (`sda1`, `nvme0n1p1`), loop, ram, dm and md devices are excluded.
pub fn is_physical_disk(name: &str) -> bool {
    PHYSICAL_DISK_RE.is_match(name)
}

pub fn is_nvme_device(name: &str) -> bool {
    name.starts_with("nvme")
}

/// Identity fields read from `smartctl -i`
#[derive(Debug, Clone, PartialEq)]
pub struct SmartIdentity {
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub capacity: String,
    pub rotation: String,
}

/// First non-unknown field among several labels
fn first_field(text: &str, labels: &[&str]) -> String {
    labels
        .iter()
        .map(|label| clean_value(&extract_field(text, label)))
        .find(|value| !is_unknown(value))
        .unwrap_or_else(unknown)
}

/// Exact capacity in bytes from the first capacity line of `smartctl -i`
///
/// smartctl prints the byte count before a decimal-unit summary
/// (`16,000,900,661,248 bytes [16.0 TB]`); only the byte count is used.
pub fn smartctl_capacity_bytes(output: &str) -> Option<u64> {
    extract_field_matching(output, &CAPACITY_BYTES_RE)
        .replace(',', "")
        .parse::<u64>()
        .ok()
        .filter(|bytes| *bytes > 0)
}

/// Parse `smartctl -i` output for ATA, SCSI and NVMe devices
///
/// Capacity uses the same binary units as the sysfs size fallback.
pub fn parse_smartctl_info(output: &str) -> SmartIdentity {
    SmartIdentity {
        model: first_field(output, &["Device Model", "Model Number", "Product"]),
        serial: first_field(output, &["Serial Number", "Serial number"]),
        firmware: first_field(output, &["Firmware Version", "Revision"]),
        capacity: smartctl_capacity_bytes(output)
            .map(bytes_to_human_readable)
            .unwrap_or_else(unknown),
        rotation: normalize_rotation(&extract_field(output, "Rotation Rate")),
    }
}

/// "7200 rpm" -> "7200", "Solid State Device" -> "SSD", anything else -> unknown
pub fn normalize_rotation(raw: &str) -> String {
    let cleaned = clean_value(raw);
    if cleaned.to_lowercase().contains("solid state") {
        return SOLID_STATE.to_string();
    }
    match RPM_RE.captures(&cleaned) {
        Some(captures) if &captures[1] != "0" => captures[1].to_string(),
        _ => unknown(),
    }
}

/// Value of one `KEY=value` line from `udevadm info --query=property`
pub fn udev_property(output: &str, key: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k == key && !v.trim().is_empty() {
            Some(v.trim().to_string())
        } else {
            None
        }
    })
}

/// Model and serial as udev reports them
pub fn parse_udev_identity(output: &str) -> (String, String) {
    let model = udev_property(output, "ID_MODEL")
        .map(|model| clean_value(&model.replace('_', " ")))
        .unwrap_or_else(unknown);
    let serial = udev_property(output, "ID_SERIAL_SHORT")
        .or_else(|| udev_property(output, "ID_SERIAL"))
        .map(|serial| clean_value(&serial))
        .unwrap_or_else(unknown);
    (model, serial)
}

/// USB bridges need SAT pass-through for SMART queries
pub fn udev_is_usb(output: &str) -> bool {
    udev_property(output, "ID_BUS").is_some_and(|bus| bus.eq_ignore_ascii_case("usb"))
}

/// udev tags RAID members through the detected filesystem type
pub fn udev_is_raid_member(output: &str) -> bool {
    udev_property(output, "ID_FS_TYPE").is_some_and(|fs| fs.ends_with("_raid_member"))
}

/// Parse sysfs size file (512-byte sectors) into bytes
pub fn parse_sysfs_size(content: &str) -> Option<u64> {
    content
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|sectors| sectors.checked_mul(512))
}

/// Human capacity from a sysfs size file, unknown for empty devices
pub fn sysfs_capacity(content: &str) -> String {
    match parse_sysfs_size(content) {
        Some(bytes) if bytes > 0 => bytes_to_human_readable(bytes),
        _ => unknown(),
    }
}

/// Parse sysfs rotational flag; `None` when the content is not 0 or 1
pub fn parse_sysfs_rotational(content: &str) -> Option<bool> {
    match content.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// RPM from `hdparm -I` output
pub fn parse_hdparm_rotation(output: &str) -> String {
    normalize_rotation(&extract_field(output, "Nominal Media Rotation Rate"))
}

/// Whether `mdadm --examine` found a RAID superblock
pub fn mdadm_examine_found_superblock(output: &str) -> bool {
    !is_unknown(&extract_field(output, "Raid Level"))
        || !is_unknown(&extract_field(output, "Magic"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN;

    #[test]
    fn test_is_physical_disk() {
        for name in ["sda", "sdab", "nvme0n1", "vdb", "xvda", "mmcblk0"] {
            assert!(is_physical_disk(name), "{name}");
        }
        for name in ["sda1", "nvme0n1p1", "loop0", "dm-0", "md0", "ram0", "sr0", "zram0"] {
            assert!(!is_physical_disk(name), "{name}");
        }
    }

    #[test]
    fn test_parse_smartctl_ata() {
        let output = r#"smartctl 7.2 2020-12-30 r5155 [x86_64-linux-5.15.0] (local build)
=== START OF INFORMATION SECTION ===
Model Family:     Seagate Exos X16
Device Model:     ST16000NM001G-2KK103
Serial Number:    ZL2ABCDE
Firmware Version: SN03
User Capacity:    16,000,900,661,248 bytes [16.0 TB]
Sector Sizes:     512 bytes logical, 4096 bytes physical
Rotation Rate:    7200 rpm
"#;
        let identity = parse_smartctl_info(output);
        assert_eq!(identity.model, "ST16000NM001G-2KK103");
        assert_eq!(identity.serial, "ZL2ABCDE");
        assert_eq!(identity.firmware, "SN03");
        assert_eq!(identity.capacity, "14.6 TiB");
        assert_eq!(identity.rotation, "7200");
    }

    #[test]
    fn test_parse_smartctl_nvme() {
        let output = r#"=== START OF INFORMATION SECTION ===
Model Number:                       SAMSUNG MZQL21T9HCJR-00A07
Serial Number:                      S64GNE0T123456
Firmware Version:                   GDC5602Q
Total NVM Capacity:                 1,920,383,410,176 [1.92 TB]
"#;
        let identity = parse_smartctl_info(output);
        assert_eq!(identity.model, "SAMSUNG MZQL21T9HCJR-00A07");
        assert_eq!(identity.capacity, "1.7 TiB");
        assert_eq!(identity.rotation, UNKNOWN);
    }

    #[test]
    fn test_smart_and_sysfs_capacity_agree() {
        let smart = parse_smartctl_info("User Capacity:    16,000,900,661,248 bytes [16.0 TB]\n");
        assert_eq!(smart.capacity, sysfs_capacity("31251759104\n"));
        assert_eq!(
            smartctl_capacity_bytes("Namespace 1 Size/Capacity:  960,197,124,096 [960 GB]\n"),
            Some(960_197_124_096)
        );
        assert_eq!(parse_smartctl_info("User Capacity: <unavailable>\n").capacity, UNKNOWN);
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation("Solid State Device"), SOLID_STATE);
        assert_eq!(normalize_rotation("10000 rpm"), "10000");
        assert_eq!(normalize_rotation(""), UNKNOWN);
        assert_eq!(normalize_rotation("0"), UNKNOWN);
    }

    #[test]
    fn test_udev_parsing() {
        let output = "DEVNAME=/dev/sdb\nID_BUS=usb\nID_MODEL=Extreme_SSD\nID_SERIAL=SanDisk_Extreme_SSD_1234\nID_SERIAL_SHORT=1234\nID_FS_TYPE=linux_raid_member\n";
        assert_eq!(
            parse_udev_identity(output),
            ("Extreme SSD".to_string(), "1234".to_string())
        );
        assert!(udev_is_usb(output));
        assert!(udev_is_raid_member(output));
        assert!(!udev_is_raid_member("ID_FS_TYPE=ext4\n"));
        assert_eq!(parse_udev_identity(""), (unknown(), unknown()));
    }

    #[test]
    fn test_sysfs_values() {
        assert_eq!(parse_sysfs_size("1953525168\n"), Some(1953525168 * 512));
        assert_eq!(sysfs_capacity("0\n"), UNKNOWN);
        assert_eq!(sysfs_capacity("2097152\n"), "1 GiB");
        assert_eq!(parse_sysfs_size(&format!("{}\n", u64::MAX)), None);
        assert_eq!(sysfs_capacity("not a number"), UNKNOWN);
        assert_eq!(parse_sysfs_rotational("0\n"), Some(false));
        assert_eq!(parse_sysfs_rotational("1"), Some(true));
        assert_eq!(parse_sysfs_rotational(""), None);
    }

    #[test]
    fn test_parse_hdparm_rotation() {
        let output = "ATA device, with non-removable media\n\tNominal Media Rotation Rate: 5400\n";
        assert_eq!(parse_hdparm_rotation(output), "5400");
        assert_eq!(
            parse_hdparm_rotation("\tNominal Media Rotation Rate: Solid State Device\n"),
            SOLID_STATE
        );
    }

    #[test]
    fn test_mdadm_examine() {
        let output = "/dev/sdb:\n          Magic : a92b4efc\n        Version : 1.2\n     Raid Level : raid1\n";
        assert!(mdadm_examine_found_superblock(output));
        assert!(!mdadm_examine_found_superblock(
            "mdadm: No md superblock detected on /dev/sda."
        ));
    }
}
