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

//! Field extraction, block tokenizing and unit normalization shared by every parser

use crate::domain::entities::{unknown, UNKNOWN};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref STORAGE_SIZE_RE: Regex =
        Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*([KMGTPE]?)(I?B)?$").unwrap();
    pub static ref KEY_VALUE_RE: Regex = Regex::new(r"^\s*([^:]+?)\s*:\s*(.*?)\s*$").unwrap();
    pub static ref DMI_HANDLE_RE: Regex = Regex::new(r"^Handle 0x[0-9A-Fa-f]+").unwrap();
    pub static ref FREQUENCY_RE: Regex =
        Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(MHz|GHz|MT/s)?$").unwrap();
}

/// Values DMI and vendor tools print instead of real data
const PLACEHOLDERS: &[&str] = &[
    "",
    "not specified",
    "not provided",
    "not available",
    "not present",
    "not settable",
    "to be filled by o.e.m.",
    "default string",
    "none",
    "unknown",
    "n/a",
    "[n/a]",
    "[not supported]",
];

/// Return the value of the first `label: value` line, or the unknown sentinel
///
/// Labels are compared case-insensitively after trimming; the first match in
/// document order wins. Empty or malformed input never errors.
///
/// # Arguments
/// * `text` - Raw tool output
/// * `label` - Field label (e.g. "Serial Number")
pub fn extract_field(text: &str, label: &str) -> String {
    let wanted = label.trim();
    for line in text.lines() {
        if let Some(captures) = KEY_VALUE_RE.captures(line) {
            if captures[1].eq_ignore_ascii_case(wanted) {
                let value = captures[2].trim();
                return if value.is_empty() {
                    unknown()
                } else {
                    value.to_string()
                };
            }
        }
    }
    unknown()
}

/// Regex flavour of `extract_field`: capture group 1 of the first match
pub fn extract_field_matching(text: &str, pattern: &Regex) -> String {
    text.lines()
        .find_map(|line| pattern.captures(line))
        .and_then(|captures| captures.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(unknown)
}

/// Map vendor placeholder strings onto the unknown sentinel
pub fn clean_value(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if PLACEHOLDERS.contains(&collapsed.to_lowercase().as_str()) {
        unknown()
    } else {
        collapsed
    }
}

/// One labelled block of a DMI-style dump
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Block title, e.g. "Memory Device"
    pub title: String,
    /// Key/value pairs in document order
    pub fields: Vec<(String, String)>,
}

impl TextBlock {
    /// First value for `key` (case-insensitive), or the unknown sentinel
    pub fn get(&self, key: &str) -> String {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| if v.is_empty() { unknown() } else { v.clone() })
            .unwrap_or_else(unknown)
    }

    /// Like `get` but with placeholders cleaned
    pub fn get_clean(&self, key: &str) -> String {
        clean_value(&self.get(key))
    }
}

/// Split a dmidecode dump into blocks
///
/// A block starts at every `Handle 0x....` line; the next non-empty line is the
/// block title. Text before the first handle (the dmidecode banner) is dropped.
pub fn split_dmi_blocks(dump: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<TextBlock> = None;

    for line in dump.lines() {
        if DMI_HANDLE_RE.is_match(line) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(TextBlock {
                title: String::new(),
                fields: Vec::new(),
            });
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if block.title.is_empty() {
            block.title = trimmed.to_string();
            continue;
        }
        if let Some(captures) = KEY_VALUE_RE.captures(trimmed) {
            block
                .fields
                .push((captures[1].to_string(), captures[2].to_string()));
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// Parse a size string (e.g. "16 GB", "16384 MB", "2.5TiB") to bytes
///
/// Units are treated as binary multiples, the way DMI and smartctl report them.
/// Returns `None` for anything that is not a plain size.
pub fn parse_size_to_bytes(size_str: &str) -> Option<u64> {
    let compact = size_str.trim().replace(',', "");
    let captures = STORAGE_SIZE_RE.captures(&compact)?;
    let number: f64 = captures[1].parse().ok()?;
    let exponent = match captures[2].to_uppercase().as_str() {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        "E" => 6,
        _ => return None,
    };
    Some((number * 1024_f64.powi(exponent)) as u64)
}

/// Convert bytes to a binary-prefix human string (e.g. "16 GiB", "1.5 TiB")
pub fn bytes_to_human_readable(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    const THRESHOLD: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 || size.fract() == 0.0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Normalize a reported size into binary-prefix units, or keep the raw text
pub fn normalize_size(raw: &str) -> String {
    if raw == UNKNOWN {
        return unknown();
    }
    match parse_size_to_bytes(raw) {
        Some(bytes) if bytes > 0 => bytes_to_human_readable(bytes),
        _ => clean_value(raw),
    }
}

/// Normalize a memory speed, reporting DMI "MHz" values as "MT/s"
pub fn normalize_transfer_rate(raw: &str) -> String {
    let cleaned = clean_value(raw);
    match FREQUENCY_RE.captures(&cleaned) {
        Some(captures) => {
            let number: f64 = captures[1].parse().unwrap_or(0.0);
            if number <= 0.0 {
                unknown()
            } else {
                format!("{} MT/s", number.round() as u64)
            }
        }
        None => cleaned,
    }
}

/// Normalize a clock frequency to whole MHz (accepts "3500.0000", "3.5 GHz")
pub fn normalize_frequency(raw: &str) -> String {
    let cleaned = clean_value(raw);
    match FREQUENCY_RE.captures(&cleaned) {
        Some(captures) => {
            let number: f64 = captures[1].parse().unwrap_or(0.0);
            let mhz = match captures.get(2).map(|m| m.as_str().to_lowercase()) {
                Some(unit) if unit == "ghz" => number * 1000.0,
                _ => number,
            };
            if mhz <= 0.0 {
                unknown()
            } else {
                format!("{} MHz", mhz.round() as u64)
            }
        }
        None => cleaned,
    }
}

/// Statistical mode; ties go to the value encountered first
pub fn dominant_value<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        if value.is_empty() || value == UNKNOWN {
            continue;
        }
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_first_match_wins() {
        let output = "System Information\n\tManufacturer: Dell Inc.\n\tProduct Name: PowerEdge R740\n\tManufacturer: Other";
        assert_eq!(extract_field(output, "Manufacturer"), "Dell Inc.");
        assert_eq!(extract_field(output, "product name"), "PowerEdge R740");
    }

    #[test]
    fn test_extract_field_never_errors() {
        assert_eq!(extract_field("", "Vendor"), UNKNOWN);
        assert_eq!(extract_field("garbage without colons", "Vendor"), UNKNOWN);
        assert_eq!(extract_field("Vendor:   ", "Vendor"), UNKNOWN);
        assert_eq!(extract_field("Vendor: AMI", "Version"), UNKNOWN);
    }

    #[test]
    fn test_extract_field_matching() {
        let re = Regex::new(r"Rotation Rate:\s*(.+)").unwrap();
        assert_eq!(
            extract_field_matching("Rotation Rate:    7200 rpm\n", &re),
            "7200 rpm"
        );
        assert_eq!(extract_field_matching("", &re), UNKNOWN);
    }

    #[test]
    fn test_clean_value_placeholders() {
        assert_eq!(clean_value("To Be Filled By O.E.M."), UNKNOWN);
        assert_eq!(clean_value("Not Specified"), UNKNOWN);
        assert_eq!(clean_value("  Samsung   "), "Samsung");
    }

    #[test]
    fn test_split_dmi_blocks_on_handle_boundary() {
        let dump = "# dmidecode 3.3\nGetting SMBIOS data from sysfs.\n\nHandle 0x1000, DMI type 16, 23 bytes\nPhysical Memory Array\n\tMaximum Capacity: 2 TB\n\nHandle 0x1100, DMI type 17, 84 bytes\nMemory Device\n\tSize: 16 GB\n\tType: DDR4\n";
        let blocks = split_dmi_blocks(dump);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].title, "Physical Memory Array");
        assert_eq!(blocks[0].get("Maximum Capacity"), "2 TB");
        assert_eq!(blocks[1].title, "Memory Device");
        assert_eq!(blocks[1].get("type"), "DDR4");
        assert_eq!(blocks[1].get("Speed"), UNKNOWN);
    }

    #[test]
    fn test_split_dmi_blocks_empty_input() {
        assert!(split_dmi_blocks("").is_empty());
        assert!(split_dmi_blocks("no handles here").is_empty());
    }

    #[test]
    fn test_parse_size_to_bytes() {
        assert_eq!(parse_size_to_bytes("16 GB"), Some(16 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_to_bytes("16384 MB"), Some(16 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_to_bytes("2 TiB"), Some(2 * 1024_u64.pow(4)));
        assert_eq!(parse_size_to_bytes("512"), Some(512));
        assert_eq!(parse_size_to_bytes("No Module Installed"), None);
        assert_eq!(parse_size_to_bytes(""), None);
    }

    #[test]
    fn test_bytes_to_human_readable() {
        assert_eq!(bytes_to_human_readable(0), "0 B");
        assert_eq!(bytes_to_human_readable(512), "512 B");
        assert_eq!(bytes_to_human_readable(40 * 1024 * 1024 * 1024), "40 GiB");
        assert_eq!(
            bytes_to_human_readable(1536 * 1024 * 1024 * 1024),
            "1.5 TiB"
        );
    }

    #[test]
    fn test_normalize_speeds() {
        assert_eq!(normalize_transfer_rate("3200 MT/s"), "3200 MT/s");
        assert_eq!(normalize_transfer_rate("2666 MHz"), "2666 MT/s");
        assert_eq!(normalize_transfer_rate("Unknown"), UNKNOWN);
        assert_eq!(normalize_frequency("3500.0000"), "3500 MHz");
        assert_eq!(normalize_frequency("3.5 GHz"), "3500 MHz");
        assert_eq!(normalize_frequency(""), UNKNOWN);
    }

    #[test]
    fn test_dominant_value() {
        assert_eq!(
            dominant_value(["DDR4", "DDR4", "DDR5"]),
            Some("DDR4".to_string())
        );
        // Tie resolves to first encountered
        assert_eq!(
            dominant_value(["DDR5", "DDR4", "DDR4", "DDR5"]),
            Some("DDR5".to_string())
        );
        assert_eq!(dominant_value(["unknown", ""]), None);
    }
}
