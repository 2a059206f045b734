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

//! Disk and RAID-membership collector

use super::{CollectionContext, Collector, SectionLog};
use crate::domain::fallback::FallbackChain;
use crate::domain::parsers::{
    is_nvme_device, is_physical_disk, mdadm_examine_found_superblock, parse_hdparm_rotation,
    parse_smartctl_info, parse_sysfs_rotational, parse_udev_identity, sysfs_capacity,
    udev_is_raid_member, udev_is_usb, SmartIdentity, SOLID_STATE,
};
use crate::domain::{is_unknown, unknown, DegradeKind, DiskRecord};
use async_trait::async_trait;

const SYS_BLOCK: &str = "/sys/block";

/// Tools the disk walk can use; each one missing is reported once
const DISK_TOOLS: &[&str] = &["smartctl", "udevadm", "hdparm", "mdadm"];

/// Walks `/sys/block` and fills every physical disk from the best source available
pub struct StorageCollector;

/// Raw inputs gathered for one disk before the fallback chains run
struct DiskFacts {
    name: String,
    device: String,
    smart: Option<SmartIdentity>,
    udev: Option<String>,
}

impl StorageCollector {
    async fn gather(ctx: &CollectionContext, log: &mut SectionLog, name: &str) -> DiskFacts {
        let device = format!("/dev/{name}");

        let udev = if ctx.has_tool("udevadm") {
            let name_arg = format!("--name={device}");
            match ctx.run("udevadm", &["info", "--query=property", &name_arg]).await {
                Ok(output) => Some(output),
                Err(e) => {
                    log.command_failed(&format!("udev properties of {device}"), &e);
                    None
                }
            }
        } else {
            None
        };

        let smart = if ctx.has_tool("smartctl") {
            let mut args = vec!["-i"];
            if is_nvme_device(name) {
                args.extend(["-d", "nvme"]);
            } else if udev.as_deref().is_some_and(udev_is_usb) {
                args.extend(["-d", "sat"]);
            }
            args.push(&device);
            match ctx.run_privileged("smartctl", &args).await {
                Ok(output) => Some(parse_smartctl_info(&output)),
                Err(e) => {
                    log.command_failed(&format!("SMART identity of {device}"), &e);
                    None
                }
            }
        } else {
            None
        };

        DiskFacts {
            name: name.to_string(),
            device,
            smart,
            udev,
        }
    }

    /// Model and serial, each from SMART identity first and udev properties second
    async fn identity(facts: &DiskFacts) -> (String, String) {
        let smart = facts.smart.as_ref();
        let udev = facts.udev.as_deref().map(parse_udev_identity);
        let udev = udev.as_ref();

        let model = FallbackChain::new("disk model")
            .then("smartctl", move || async move {
                smart.map(|smart| smart.model.clone()).filter(|model| !is_unknown(model))
            })
            .then("udev", move || async move {
                udev.map(|(model, _)| model.clone()).filter(|model| !is_unknown(model))
            })
            .resolve_or(unknown())
            .await;
        let serial = FallbackChain::new("disk serial")
            .then("smartctl", move || async move {
                smart.map(|smart| smart.serial.clone()).filter(|serial| !is_unknown(serial))
            })
            .then("udev", move || async move {
                udev.map(|(_, serial)| serial.clone()).filter(|serial| !is_unknown(serial))
            })
            .resolve_or(unknown())
            .await;
        (model, serial)
    }

    /// Capacity: SMART capacity, then the raw sector count in sysfs
    async fn capacity(ctx: &CollectionContext, facts: &DiskFacts) -> String {
        FallbackChain::new("disk capacity")
            .then("smartctl", move || async move {
                facts
                    .smart
                    .as_ref()
                    .map(|smart| smart.capacity.clone())
                    .filter(|capacity| !is_unknown(capacity))
            })
            .then("sysfs size", move || async move {
                ctx.read(&format!("{SYS_BLOCK}/{}/size", facts.name))
                    .await
                    .map(|content| sysfs_capacity(&content))
                    .filter(|capacity| !is_unknown(capacity))
            })
            .resolve_or(unknown())
            .await
    }

    /// Rotation: SMART rate, NVMe, sysfs rotational flag, then hdparm on SATA
    async fn rotation(ctx: &CollectionContext, facts: &DiskFacts) -> String {
        FallbackChain::new("disk rotation")
            .then("smartctl", move || async move {
                facts
                    .smart
                    .as_ref()
                    .map(|smart| smart.rotation.clone())
                    .filter(|rotation| !is_unknown(rotation))
            })
            .then("nvme", move || async move {
                is_nvme_device(&facts.name).then(|| SOLID_STATE.to_string())
            })
            .then("sysfs rotational", move || async move {
                let content = ctx
                    .read(&format!("{SYS_BLOCK}/{}/queue/rotational", facts.name))
                    .await?;
                // A spinning flag alone carries no RPM; later strategies may
                match parse_sysfs_rotational(&content)? {
                    false => Some(SOLID_STATE.to_string()),
                    true => None,
                }
            })
            .then("hdparm", move || async move {
                if !facts.name.starts_with("sd") || !ctx.has_tool("hdparm") {
                    return None;
                }
                let output = ctx
                    .run_privileged("hdparm", &["-I", &facts.device])
                    .await
                    .ok()?;
                Some(parse_hdparm_rotation(&output)).filter(|rotation| !is_unknown(rotation))
            })
            .resolve_or(unknown())
            .await
    }

    /// True when any one RAID-membership signal fires
    ///
    /// Signals are tried in order of cost and each failure is independent:
    /// a kernel md personality directory, the udev filesystem type, then an
    /// mdadm superblock examination.
    async fn raid_member(ctx: &CollectionContext, facts: &DiskFacts) -> bool {
        FallbackChain::new("raid membership")
            .then("md personality", move || async move {
                let base = format!("{SYS_BLOCK}/{}", facts.name);
                let holder_is_md = ctx
                    .list(&format!("{base}/holders"))
                    .await
                    .iter()
                    .any(|holder| holder.starts_with("md"));
                (holder_is_md || ctx.exists(&format!("{base}/md")).await).then_some(true)
            })
            .then("udev", move || async move {
                facts
                    .udev
                    .as_deref()
                    .is_some_and(udev_is_raid_member)
                    .then_some(true)
            })
            .then("mdadm examine", move || async move {
                if !ctx.has_tool("mdadm") {
                    return None;
                }
                let output = ctx
                    .run_privileged("mdadm", &["--examine", &facts.device])
                    .await
                    .ok()?;
                mdadm_examine_found_superblock(&output).then_some(true)
            })
            .resolve_or(false)
            .await
    }

    async fn collect_disk(ctx: &CollectionContext, log: &mut SectionLog, name: &str) -> DiskRecord {
        let facts = Self::gather(ctx, log, name).await;
        let (model, serial) = Self::identity(&facts).await;

        let disk = DiskRecord {
            device: facts.device.clone(),
            model,
            serial,
            firmware: facts
                .smart
                .as_ref()
                .map(|smart| smart.firmware.clone())
                .unwrap_or_else(unknown),
            capacity: Self::capacity(ctx, &facts).await,
            rotation: Self::rotation(ctx, &facts).await,
            raid_member: Self::raid_member(ctx, &facts).await,
        };

        if is_unknown(&disk.model) {
            log.parse_miss(&disk.device, "model not reported by any source");
        }
        if is_unknown(&disk.capacity) {
            log.parse_miss(&disk.device, "capacity not reported by any source");
        }
        disk
    }
}

#[async_trait]
impl Collector for StorageCollector {
    type Output = Vec<DiskRecord>;

    fn section(&self) -> &'static str {
        "storage"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> Vec<DiskRecord> {
        for tool in DISK_TOOLS {
            if !ctx.has_tool(tool) {
                log.degrade(DegradeKind::ToolMissing, format!("{tool} is not installed"));
            }
        }

        let names: Vec<String> = ctx
            .list(SYS_BLOCK)
            .await
            .into_iter()
            .filter(|name| is_physical_disk(name))
            .collect();
        if names.is_empty() {
            log.parse_miss("disks", "no physical block devices under /sys/block");
        }

        let mut disks = Vec::with_capacity(names.len());
        for name in &names {
            disks.push(Self::collect_disk(ctx, log, name).await);
        }
        disks.sort_by(|a, b| a.device.cmp(&b.device));
        disks
    }
}
