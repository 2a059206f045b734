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

//! CPU topology collector

use super::{CollectionContext, Collector, SectionLog};
use crate::domain::parsers::{
    clean_value, merge_cpu_profiles, parse_lscpu_output, parse_proc_cpuinfo,
};
use crate::domain::{is_unknown, CpuProfile, DegradeKind};
use async_trait::async_trait;
use log::debug;
use sysinfo::System;

const PROC_CPUINFO: &str = "/proc/cpuinfo";

/// lscpu first; gaps are filled from /proc/cpuinfo, then from sysinfo on a live host
pub struct CpuCollector;

/// Model, architecture and logical count as sysinfo sees them
fn sysinfo_profile() -> CpuProfile {
    let mut system = System::new();
    system.refresh_cpu_all();
    let cpus = system.cpus();

    let mut profile = CpuProfile {
        architecture: std::env::consts::ARCH.to_string(),
        ..CpuProfile::default()
    };
    if let Some(first) = cpus.first() {
        profile.model = clean_value(first.brand());
        profile.logical_cpus = cpus.len().to_string();
    }
    profile
}

fn has_gaps(profile: &CpuProfile) -> bool {
    [
        &profile.architecture,
        &profile.model,
        &profile.logical_cpus,
        &profile.cores_per_socket,
        &profile.sockets,
        &profile.max_speed,
    ]
    .into_iter()
    .any(|value| is_unknown(value))
}

#[async_trait]
impl Collector for CpuCollector {
    type Output = CpuProfile;

    fn section(&self) -> &'static str {
        "cpu"
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> CpuProfile {
        let mut profile = match ctx.run("lscpu", &[]).await {
            Ok(output) => parse_lscpu_output(&output),
            Err(e) => {
                log.command_failed("lscpu", &e);
                CpuProfile::default()
            }
        };

        if has_gaps(&profile) {
            if let Some(cpuinfo) = ctx.read(PROC_CPUINFO).await {
                debug!("filling cpu gaps from {PROC_CPUINFO}");
                profile = merge_cpu_profiles(profile, parse_proc_cpuinfo(&cpuinfo));
            }
        }
        // sysinfo reads this process's machine, which a replayed host is not
        if has_gaps(&profile) && ctx.is_live_host() {
            if let Ok(fallback) = tokio::task::spawn_blocking(sysinfo_profile).await {
                debug!("filling cpu gaps from sysinfo");
                profile = merge_cpu_profiles(profile, fallback);
            }
        }

        if is_unknown(&profile.model) {
            log.degrade(DegradeKind::ParseMiss, "model name not reported");
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, write};
    use super::super::run_collector;
    use super::*;
    use crate::adapters::SimulatedCommandExecutor;
    use crate::domain::UNKNOWN;

    #[tokio::test]
    async fn test_lscpu_profile() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulatedCommandExecutor::new().with_tools(&["lscpu"]).with_output(
            "lscpu",
            "Architecture: aarch64\nCPU(s): 72\nModel name: Neoverse-V2\nCore(s) per socket: 72\nSocket(s): 1\nCPU max MHz: 3447.0000\n",
        );
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&CpuCollector, &ctx).await;
        assert_eq!(section.data.architecture, "aarch64");
        assert_eq!(section.data.model, "Neoverse-V2");
        assert_eq!(section.data.logical_cpus, "72");
        assert_eq!(section.data.max_speed, "3447 MHz");
        assert!(section.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_simulated_host_without_sources_stays_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(SimulatedCommandExecutor::new(), dir.path()).await;

        let section = run_collector(&CpuCollector, &ctx).await;
        assert_eq!(section.data, CpuProfile::default());
        let kinds: Vec<DegradeKind> = section.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![DegradeKind::ToolMissing, DegradeKind::ParseMiss]);
    }

    #[tokio::test]
    async fn test_cpuinfo_fills_lscpu_gaps() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "/proc/cpuinfo",
            "processor\t: 0\nmodel name\t: Intel(R) Xeon(R) Gold 6430\nphysical id\t: 0\ncpu cores\t: 32\n\nprocessor\t: 1\nmodel name\t: Intel(R) Xeon(R) Gold 6430\nphysical id\t: 0\ncpu cores\t: 32\n",
        );
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["lscpu"])
            .with_output("lscpu", "Architecture: x86_64\nCPU(s): 64\n");
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&CpuCollector, &ctx).await;
        assert_eq!(section.data.architecture, "x86_64");
        assert_eq!(section.data.logical_cpus, "64");
        assert_eq!(section.data.model, "Intel(R) Xeon(R) Gold 6430");
        assert_eq!(section.data.sockets, "1");
        assert_eq!(section.data.cores_per_socket, "32");
        assert_eq!(section.data.max_speed, UNKNOWN);
        assert!(section.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_sysinfo_fallback_only_on_live_host() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(SimulatedCommandExecutor::new(), dir.path())
            .await
            .with_live_host(true);

        let section = run_collector(&CpuCollector, &ctx).await;
        assert_eq!(section.data.architecture, std::env::consts::ARCH);
        assert_eq!(section.data.max_speed, UNKNOWN);
        assert!(section
            .warnings
            .iter()
            .any(|w| w.kind == DegradeKind::ToolMissing));
    }
}
