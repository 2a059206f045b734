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

//! Memory information parsing functions

use super::common::{
    bytes_to_human_readable, dominant_value, normalize_size, normalize_transfer_rate,
    parse_size_to_bytes, split_dmi_blocks, TextBlock,
};
use crate::domain::{unknown, DimmRecord, MemorySummary};

const MEMORY_DEVICE: &str = "Memory Device";
const MEMORY_ARRAY: &str = "Physical Memory Array";

/// Parse populated memory slots from `dmidecode -t memory` output
///
/// A slot whose size reads "No Module Installed" (or does not parse as a
/// size) contributes no record.
///
/// # Arguments
/// * `dmidecode_output` - Raw output from dmidecode -t memory
pub fn parse_dmidecode_memory(dmidecode_output: &str) -> Vec<DimmRecord> {
    split_dmi_blocks(dmidecode_output)
        .iter()
        .filter(|block| block.title == MEMORY_DEVICE)
        .filter_map(parse_memory_device)
        .collect()
}

fn parse_memory_device(block: &TextBlock) -> Option<DimmRecord> {
    let raw_size = block.get("Size");
    let bytes = parse_size_to_bytes(&raw_size)?;
    if bytes == 0 {
        return None;
    }

    Some(DimmRecord {
        locator: block.get_clean("Locator"),
        size: normalize_size(&raw_size),
        type_: block.get_clean("Type"),
        speed: normalize_transfer_rate(&block.get("Speed")),
        manufacturer: block.get_clean("Manufacturer"),
        serial: block.get_clean("Serial Number"),
    })
}

/// Sum of `Maximum Capacity` over every physical memory array, in bytes
pub fn parse_max_capacity(dmidecode_output: &str) -> Option<u64> {
    let capacities: Vec<u64> = split_dmi_blocks(dmidecode_output)
        .iter()
        .filter(|block| block.title == MEMORY_ARRAY)
        .filter_map(|block| parse_size_to_bytes(&block.get("Maximum Capacity")))
        .collect();

    if capacities.is_empty() {
        None
    } else {
        Some(capacities.iter().sum())
    }
}

/// Total installed bytes across the given slots
pub fn total_installed_bytes(dimms: &[DimmRecord]) -> u64 {
    dimms
        .iter()
        .filter_map(|dimm| parse_size_to_bytes(&dimm.size))
        .sum()
}

/// Derive the memory summary from the slot list
///
/// The dominant type is the most frequent `type` among populated slots; a tie
/// goes to the type seen first in slot order.
pub fn summarize_dimms(dimms: &[DimmRecord], max_capacity: Option<u64>) -> MemorySummary {
    let total = total_installed_bytes(dimms);
    MemorySummary {
        total: if total > 0 {
            bytes_to_human_readable(total)
        } else {
            unknown()
        },
        max_capacity: max_capacity
            .filter(|bytes| *bytes > 0)
            .map(bytes_to_human_readable)
            .unwrap_or_else(unknown),
        dominant_type: dominant_value(dimms.iter().map(|dimm| dimm.type_.as_str()))
            .unwrap_or_else(unknown),
    }
}
