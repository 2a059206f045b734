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

//! System/BIOS identity parsing functions

use super::common::{clean_value, extract_field};
use crate::domain::{BiosInfo, SystemIdentity};

/// Parse system identity from `dmidecode -t system` output
///
/// The BIOS part is left unknown; it comes from a separate query.
pub fn parse_dmidecode_system_info(dmidecode_output: &str) -> SystemIdentity {
    SystemIdentity {
        vendor: clean_value(&extract_field(dmidecode_output, "Manufacturer")),
        product: clean_value(&extract_field(dmidecode_output, "Product Name")),
        serial: clean_value(&extract_field(dmidecode_output, "Serial Number")),
        uuid: clean_value(&extract_field(dmidecode_output, "UUID")),
        bios: BiosInfo::default(),
    }
}

/// Parse BIOS information from `dmidecode -t bios` output
pub fn parse_dmidecode_bios_info(dmidecode_output: &str) -> BiosInfo {
    BiosInfo {
        vendor: clean_value(&extract_field(dmidecode_output, "Vendor")),
        version: clean_value(&extract_field(dmidecode_output, "Version")),
        date: clean_value(&extract_field(dmidecode_output, "Release Date")),
    }
}
