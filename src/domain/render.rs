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

//! Output rendering: column-aligned text tables or one of the JSON projections

use crate::domain::{
    CanonicalDocument, EthernetRole, InterconnectDevice, OutputFormat, PciCategory, ReportError,
};
use std::fmt::Write;

/// Render the document in the requested format
///
/// JSON output is pretty-printed and deterministic for a given document.
pub fn render(document: &CanonicalDocument, format: OutputFormat) -> Result<String, ReportError> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&document.flat()),
        OutputFormat::JsonTree => serde_json::to_string_pretty(&document.hierarchical()),
        OutputFormat::Text => return Ok(render_text(document)),
    };
    rendered
        .map(|mut json| {
            json.push('\n');
            json
        })
        .map_err(|e| ReportError::SerializationFailed(e.to_string()))
}

/// Left-aligned table with one space-padded column per header
struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn write_to(&self, out: &mut String) {
        if self.rows.is_empty() {
            out.push_str("  (none)\n");
            return;
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: Vec<&str>| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            format!("  {}\n", padded.join("  ").trim_end())
        };

        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        out.push_str(&line(self.headers.clone()));
        out.push_str(&line(rule.iter().map(String::as_str).collect()));
        for row in &self.rows {
            out.push_str(&line(row.iter().map(String::as_str).collect()));
        }
    }
}

fn heading(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{title}:");
    let _ = writeln!(out, "{}", "=".repeat(title.len() + 1));
}

fn category_label(category: PciCategory) -> &'static str {
    match category {
        PciCategory::Graphics => "graphics",
        PciCategory::Network => "network",
        PciCategory::Storage => "storage",
        PciCategory::Other => "other",
    }
}

fn role_label(role: EthernetRole) -> &'static str {
    match role {
        EthernetRole::Nic => "NIC",
        EthernetRole::Dpu => "DPU",
    }
}

fn render_text(document: &CanonicalDocument) -> String {
    let mut out = String::new();

    let system = &document.system;
    heading(&mut out, "System");
    let mut table = Table::new(&["Field", "Value"]);
    for (field, value) in [
        ("Vendor", &system.vendor),
        ("Product", &system.product),
        ("Serial", &system.serial),
        ("UUID", &system.uuid),
        ("BIOS vendor", &system.bios.vendor),
        ("BIOS version", &system.bios.version),
        ("BIOS date", &system.bios.date),
    ] {
        table.row(vec![field.to_string(), value.clone()]);
    }
    table.write_to(&mut out);

    let cpu = &document.cpu;
    heading(&mut out, "CPU");
    let mut table = Table::new(&["Field", "Value"]);
    for (field, value) in [
        ("Model", &cpu.model),
        ("Architecture", &cpu.architecture),
        ("Logical CPUs", &cpu.logical_cpus),
        ("Cores per socket", &cpu.cores_per_socket),
        ("Sockets", &cpu.sockets),
        ("Max speed", &cpu.max_speed),
    ] {
        table.row(vec![field.to_string(), value.clone()]);
    }
    table.write_to(&mut out);

    let memory = &document.memory;
    heading(&mut out, "Memory");
    let _ = writeln!(
        out,
        "  Total: {}  Max capacity: {}  Dominant type: {}",
        memory.summary.total, memory.summary.max_capacity, memory.summary.dominant_type
    );
    let mut table = Table::new(&["Locator", "Size", "Type", "Speed", "Manufacturer", "Serial"]);
    for dimm in &memory.dimms {
        table.row(vec![
            dimm.locator.clone(),
            dimm.size.clone(),
            dimm.type_.clone(),
            dimm.speed.clone(),
            dimm.manufacturer.clone(),
            dimm.serial.clone(),
        ]);
    }
    table.write_to(&mut out);

    heading(&mut out, "Storage");
    let mut table = Table::new(&[
        "Device", "Model", "Serial", "Firmware", "Capacity", "Rotation", "RAID member",
    ]);
    for disk in &document.storage.disks {
        table.row(vec![
            disk.device.clone(),
            disk.model.clone(),
            disk.serial.clone(),
            disk.firmware.clone(),
            disk.capacity.clone(),
            disk.rotation.clone(),
            if disk.raid_member { "yes" } else { "no" }.to_string(),
        ]);
    }
    table.write_to(&mut out);

    let raid = &document.storage.raid;
    heading(&mut out, "RAID");
    let _ = writeln!(out, "  {}", raid.summary);
    if !raid.arrays.is_empty() {
        let mut table = Table::new(&["Array", "Level", "State", "Devices"]);
        for array in &raid.arrays {
            table.row(vec![
                array.name.clone(),
                array.level.clone(),
                array.state.clone(),
                array.devices.join(","),
            ]);
        }
        table.write_to(&mut out);
    }

    heading(&mut out, "PCI Devices");
    let mut table = Table::new(&["Slot", "Category", "Class", "Description"]);
    for device in &document.pci {
        table.row(vec![
            device.slot.clone(),
            category_label(device.category).to_string(),
            device.class.clone(),
            device.description.clone(),
        ]);
    }
    table.write_to(&mut out);

    heading(&mut out, "GPUs");
    let mut table = Table::new(&["Slot", "Name", "UUID", "Serial", "Source"]);
    for gpu in &document.gpus {
        table.row(vec![
            gpu.slot.clone(),
            gpu.name.clone(),
            gpu.uuid.clone(),
            gpu.serial.clone(),
            gpu.source.clone(),
        ]);
    }
    table.write_to(&mut out);

    heading(&mut out, "Interconnects");
    let mut table = Table::new(&["Kind", "Device", "Port", "State", "Detail"]);
    for device in &document.interconnects {
        match device {
            InterconnectDevice::Ethernet(nic) => {
                table.row(vec![
                    role_label(nic.role).to_string(),
                    nic.slot.clone(),
                    String::new(),
                    String::new(),
                    nic.description.clone(),
                ]);
                for interface in &nic.interfaces {
                    table.row(vec![
                        String::new(),
                        String::new(),
                        interface.name.clone(),
                        interface.mac.clone(),
                        format!("{} fw {}", interface.driver, interface.firmware),
                    ]);
                }
            }
            InterconnectDevice::Infiniband(hca) => {
                table.row(vec![
                    "InfiniBand".to_string(),
                    hca.name.clone(),
                    String::new(),
                    String::new(),
                    format!("{} fw {} ({})", hca.hca_type, hca.firmware, hca.node_description),
                ]);
                for port in &hca.ports {
                    table.row(vec![
                        String::new(),
                        String::new(),
                        port.port.clone(),
                        format!("{}/{}", port.state, port.physical_state),
                        port.rate.clone(),
                    ]);
                }
            }
            InterconnectDevice::NvSwitch(switch) => {
                table.row(vec![
                    "NVSwitch".to_string(),
                    switch.index.clone(),
                    String::new(),
                    String::new(),
                    format!("{} {} fw {}", switch.family, switch.model, switch.firmware),
                ]);
                for link in &switch.links {
                    table.row(vec![
                        String::new(),
                        String::new(),
                        link.link.clone(),
                        link.state.clone(),
                        format!("{} {}", link.peer, link.bandwidth),
                    ]);
                }
            }
        }
    }
    table.write_to(&mut out);

    out
}
