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

//! System/BIOS identity collector

use super::{CollectionContext, Collector, SectionLog};
use crate::domain::parsers::{clean_value, parse_dmidecode_bios_info, parse_dmidecode_system_info};
use crate::domain::{is_unknown, BiosInfo, SystemIdentity};
use async_trait::async_trait;

const DMI_SYSFS: &str = "/sys/class/dmi/id";

/// dmidecode first, then `/sys/class/dmi/id` for whatever is still unknown
pub struct SystemCollector;

impl SystemCollector {
    async fn sysfs_value(ctx: &CollectionContext, attribute: &str) -> Option<String> {
        let value = clean_value(&ctx.read(&format!("{DMI_SYSFS}/{attribute}")).await?);
        (!is_unknown(&value)).then_some(value)
    }

    /// Replace an unknown field with the sysfs attribute, if readable
    async fn fill(ctx: &CollectionContext, field: &mut String, attribute: &str) {
        if is_unknown(field) {
            if let Some(value) = Self::sysfs_value(ctx, attribute).await {
                *field = value;
            }
        }
    }

    async fn identity(ctx: &CollectionContext, log: &mut SectionLog) -> SystemIdentity {
        let mut identity = match ctx.run_privileged("dmidecode", &["-t", "system"]).await {
            Ok(output) => parse_dmidecode_system_info(&output),
            Err(e) => {
                log.command_failed("dmidecode -t system", &e);
                SystemIdentity::default()
            }
        };

        Self::fill(ctx, &mut identity.vendor, "sys_vendor").await;
        Self::fill(ctx, &mut identity.product, "product_name").await;
        Self::fill(ctx, &mut identity.serial, "product_serial").await;
        Self::fill(ctx, &mut identity.uuid, "product_uuid").await;
        identity
    }

    async fn bios(ctx: &CollectionContext, log: &mut SectionLog) -> BiosInfo {
        let mut bios = match ctx.run_privileged("dmidecode", &["-t", "bios"]).await {
            Ok(output) => parse_dmidecode_bios_info(&output),
            Err(e) => {
                log.command_failed("dmidecode -t bios", &e);
                BiosInfo::default()
            }
        };

        Self::fill(ctx, &mut bios.vendor, "bios_vendor").await;
        Self::fill(ctx, &mut bios.version, "bios_version").await;
        Self::fill(ctx, &mut bios.date, "bios_date").await;
        bios
    }
}

#[async_trait]
impl Collector for SystemCollector {
    type Output = SystemIdentity;

    fn section(&self) -> &'static str {
        "system"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> SystemIdentity {
        let mut identity = Self::identity(ctx, log).await;
        identity.bios = Self::bios(ctx, log).await;

        for (name, value) in [
            ("vendor", &identity.vendor),
            ("product", &identity.product),
            ("serial", &identity.serial),
            ("uuid", &identity.uuid),
        ] {
            if is_unknown(value) {
                log.parse_miss(name, "no source reported a value");
            }
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, write};
    use super::super::run_collector;
    use super::*;
    use crate::adapters::SimulatedCommandExecutor;
    use crate::domain::{DegradeKind, PrivilegeMode, UNKNOWN};

    const DMI_SYSTEM: &str = r#"# dmidecode 3.3
Handle 0x0001, DMI type 1, 27 bytes
System Information
	Manufacturer: Supermicro
	Product Name: SYS-821GE-TNHR
	Version: 0123456789
	Serial Number: S123456X
	UUID: 4c4c4544-0042-3510-8056-b4c04f4e4d32
"#;

    #[tokio::test]
    async fn test_dmidecode_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "/sys/class/dmi/id/sys_vendor", "Other Vendor\n");
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["dmidecode"])
            .with_privilege(PrivilegeMode::Root)
            .with_output("dmidecode -t system", DMI_SYSTEM);
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&SystemCollector, &ctx).await;
        assert_eq!(section.data.vendor, "Supermicro");
        assert_eq!(section.data.serial, "S123456X");
        assert_eq!(section.data.bios.vendor, UNKNOWN);
    }

    #[tokio::test]
    async fn test_sysfs_fallback_without_privilege() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "/sys/class/dmi/id/sys_vendor", "Dell Inc.\n");
        write(dir.path(), "/sys/class/dmi/id/product_name", "PowerEdge R750\n");
        write(dir.path(), "/sys/class/dmi/id/bios_version", "1.8.2\n");
        write(
            dir.path(),
            "/sys/class/dmi/id/product_serial",
            "To Be Filled By O.E.M.\n",
        );
        let executor = SimulatedCommandExecutor::new().with_tools(&["dmidecode"]);
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&SystemCollector, &ctx).await;
        assert_eq!(section.data.vendor, "Dell Inc.");
        assert_eq!(section.data.product, "PowerEdge R750");
        assert_eq!(section.data.serial, UNKNOWN);
        assert_eq!(section.data.bios.version, "1.8.2");
        assert!(section
            .warnings
            .iter()
            .any(|w| w.kind == DegradeKind::PermissionDenied));
    }
}
