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

//! RAID array collector: md arrays from /proc/mdstat plus one hardware RAID dump

use super::{CollectionContext, Collector, SectionLog};
use crate::domain::parsers::{parse_mdadm_detail, parse_mdstat, MdstatArray};
use crate::domain::{is_unknown, unknown, HardwareRaidDump, RaidArray, RaidStatus, NO_RAID_DETECTED};
use async_trait::async_trait;

const MDSTAT: &str = "/proc/mdstat";

/// Configuration dump arguments for each hardware RAID tool
fn dump_args(tool: &str) -> &'static [&'static str] {
    match tool {
        "ssacli" => &["ctrl", "all", "show", "config", "detail"],
        "arcconf" => &["GETCONFIG", "1", "AL"],
        "MegaCli64" => &["-LDInfo", "-Lall", "-aALL"],
        // storcli and its Dell rebrand share a syntax
        _ => &["/call", "show", "all"],
    }
}

pub struct RaidCollector;

impl RaidCollector {
    async fn software_array(
        ctx: &CollectionContext,
        log: &mut SectionLog,
        array: MdstatArray,
    ) -> RaidArray {
        let mut record = RaidArray {
            name: array.name,
            level: array.level,
            state: array.state,
            devices: array.members,
            detail: unknown(),
        };
        if !ctx.has_tool("mdadm") {
            return record;
        }

        let device = format!("/dev/{}", record.name);
        match ctx.run_privileged("mdadm", &["--detail", &device]).await {
            Ok(output) => {
                let detail = parse_mdadm_detail(&output);
                if !is_unknown(&detail.level) {
                    record.level = detail.level;
                }
                if !is_unknown(&detail.state) {
                    record.state = detail.state;
                }
                if !detail.devices.is_empty() {
                    record.devices = detail.devices;
                }
                record.detail = output.trim_end().to_string();
            }
            Err(e) => log.command_failed(&format!("mdadm --detail {device}"), &e),
        }
        record
    }

    async fn hardware_dump(ctx: &CollectionContext, log: &mut SectionLog) -> Option<HardwareRaidDump> {
        let tool = ctx.capabilities().hardware_raid_tool()?;
        match ctx.run_privileged(tool, dump_args(tool)).await {
            Ok(output) => Some(HardwareRaidDump {
                tool: tool.to_string(),
                config: output.trim_end().to_string(),
            }),
            Err(e) => {
                log.command_failed(&format!("{tool} configuration dump"), &e);
                Some(HardwareRaidDump {
                    tool: tool.to_string(),
                    config: unknown(),
                })
            }
        }
    }
}

fn summarize(status: &RaidStatus) -> String {
    let mut parts = Vec::new();
    if !status.arrays.is_empty() {
        let names: Vec<&str> = status.arrays.iter().map(|a| a.name.as_str()).collect();
        parts.push(format!("software RAID: {}", names.join(", ")));
    }
    for dump in &status.hardware {
        parts.push(format!("hardware RAID tool: {}", dump.tool));
    }
    if parts.is_empty() {
        NO_RAID_DETECTED.to_string()
    } else {
        parts.join("; ")
    }
}

#[async_trait]
impl Collector for RaidCollector {
    type Output = RaidStatus;

    fn section(&self) -> &'static str {
        "raid"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> RaidStatus {
        let mut status = RaidStatus::default();

        if let Some(mdstat) = ctx.read(MDSTAT).await {
            for array in parse_mdstat(&mdstat) {
                status
                    .arrays
                    .push(Self::software_array(ctx, log, array).await);
            }
            status.mdstat = mdstat.trim_end().to_string();
        }

        status.hardware.extend(Self::hardware_dump(ctx, log).await);
        status.summary = summarize(&status);
        status
    }
}
