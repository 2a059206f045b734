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

//! Section collectors and the context they share
//!
//! Each collector owns one slot of the canonical document. Collectors never
//! return errors: every failure degrades a field to unknown and is recorded
//! as a [`Warning`].

pub mod cpu;
pub mod interconnect;
pub mod memory;
pub mod pci;
pub mod raid;
pub mod storage;
pub mod system;

pub use cpu::CpuCollector;
pub use interconnect::{
    EthernetCollector, InfinibandCollector, InterconnectCollector, NvSwitchCollector,
};
pub use memory::MemoryCollector;
pub use pci::{PciCollector, PciInventory};
pub use raid::RaidCollector;
pub use storage::StorageCollector;
pub use system::SystemCollector;

use crate::domain::{
    Capabilities, CommandError, DegradeKind, PrivilegeMode, SystemError, Warning,
};
use crate::ports::{CommandExecutor, HostFilesystem, SystemCommand};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// A capability a collector needs before it can produce anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// External tool must be installed
    Tool(&'static str),
    /// Root or non-interactive sudo
    Privilege,
    /// nvidia-smi must support the nvswitch subcommand
    NvSwitchQuery,
}

impl Requirement {
    fn unmet(&self, capabilities: &Capabilities) -> Option<(DegradeKind, String)> {
        match self {
            Requirement::Tool(tool) if !capabilities.has(tool) => Some((
                DegradeKind::ToolMissing,
                format!("{tool} is not installed"),
            )),
            Requirement::Privilege if !capabilities.can_run_privileged() => Some((
                DegradeKind::PermissionDenied,
                "root or non-interactive sudo required".to_string(),
            )),
            Requirement::NvSwitchQuery if !capabilities.nvswitch_query => Some((
                DegradeKind::ToolMissing,
                "nvidia-smi does not support nvswitch queries".to_string(),
            )),
            _ => None,
        }
    }
}

/// Typed collector output plus the warnings raised while producing it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section<T> {
    pub data: T,
    pub warnings: Vec<Warning>,
}

/// Warning sink for one section; every entry is also logged
#[derive(Debug)]
pub struct SectionLog {
    section: &'static str,
    warnings: Vec<Warning>,
}

impl SectionLog {
    pub fn new(section: &'static str) -> Self {
        Self {
            section,
            warnings: Vec::new(),
        }
    }

    pub fn degrade(&mut self, kind: DegradeKind, detail: impl Into<String>) {
        let warning = Warning::new(self.section, kind, detail);
        warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Record a failed external call against the field it was meant to fill
    pub fn command_failed(&mut self, target: &str, err: &CommandError) {
        self.degrade(DegradeKind::from(err), format!("{target}: {err}"));
    }

    pub fn parse_miss(&mut self, target: &str, detail: &str) {
        self.degrade(DegradeKind::ParseMiss, format!("{target}: {detail}"));
    }

    /// Fold a sub-collector's warnings into this log without logging again
    pub fn absorb(&mut self, warnings: Vec<Warning>) {
        self.warnings.extend(warnings);
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// Shared, read-only state handed to every collector
#[derive(Clone)]
pub struct CollectionContext {
    executor: Arc<dyn CommandExecutor>,
    filesystem: Arc<dyn HostFilesystem>,
    capabilities: Capabilities,
    timeout: Duration,
    live_host: bool,
}

impl CollectionContext {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        filesystem: Arc<dyn HostFilesystem>,
        capabilities: Capabilities,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            filesystem,
            capabilities,
            timeout,
            live_host: false,
        }
    }

    /// Mark the run as reading the machine the process executes on
    ///
    /// Only then may collectors consult in-process sources such as `sysinfo`.
    pub fn with_live_host(mut self, live_host: bool) -> Self {
        self.live_host = live_host;
        self
    }

    pub fn is_live_host(&self) -> bool {
        self.live_host
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.capabilities.has(tool)
    }

    /// Run an unprivileged tool and return its stdout
    ///
    /// A non-zero exit still counts as success when stdout is non-empty;
    /// smartctl and several RAID tools report partial results through exit bits.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        self.invoke(program, args, false).await
    }

    /// Run a tool that needs root, through `sudo -n` unless already root
    pub async fn run_privileged(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        self.invoke(program, args, true).await
    }

    async fn invoke(
        &self,
        program: &str,
        args: &[&str],
        privileged: bool,
    ) -> Result<String, CommandError> {
        if !self.capabilities.has(program) {
            return Err(SystemError::CommandNotFound(program.to_string()).into());
        }

        let command = SystemCommand::new(program)
            .args(args)
            .timeout(self.timeout);
        debug!("running {}", command.command_line());

        let output = match (privileged, self.capabilities.privilege) {
            (false, _) | (true, PrivilegeMode::Root) => self.executor.execute(&command).await?,
            (true, PrivilegeMode::Elevatable) => {
                self.executor.execute_with_privileges(&command).await?
            }
            (true, PrivilegeMode::None) => {
                return Err(SystemError::PermissionDenied(format!(
                    "{} needs root",
                    command.command_line()
                ))
                .into())
            }
        };

        if privileged && output.sudo_refused() {
            Err(SystemError::PermissionDenied(format!(
                "{}: {}",
                command.command_line(),
                output.stderr.trim()
            ))
            .into())
        } else if output.success || !output.stdout.trim().is_empty() {
            Ok(output.stdout)
        } else {
            Err(SystemError::CommandFailed {
                command: command.command_line(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            }
            .into())
        }
    }

    /// Read a host file; `None` when it does not exist or cannot be read
    pub async fn read(&self, path: &str) -> Option<String> {
        match self.filesystem.read_to_string(path).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!("read {path}: {e}");
                None
            }
        }
    }

    /// Sorted directory entries; empty when the directory is absent
    pub async fn list(&self, path: &str) -> Vec<String> {
        self.filesystem.list_dir(path).await.unwrap_or_default()
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.filesystem.exists(path).await
    }

    pub async fn link_name(&self, path: &str) -> Option<String> {
        self.filesystem.link_target_name(path).await.ok()
    }
}

/// A capability-gated producer of one document section
#[async_trait]
pub trait Collector: Send + Sync {
    type Output: Default + Send;

    /// Section name used in warnings
    fn section(&self) -> &'static str;

    /// Capabilities without which the collector is skipped
    fn requirements(&self) -> Vec<Requirement> {
        Vec::new()
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> Self::Output;
}

/// Run a collector, or skip it with a default output when a requirement is unmet
pub async fn run_collector<C: Collector>(
    collector: &C,
    ctx: &CollectionContext,
) -> Section<C::Output> {
    let section = collector.section();
    let mut log = SectionLog::new(section);

    let unmet: Vec<(DegradeKind, String)> = collector
        .requirements()
        .iter()
        .filter_map(|requirement| requirement.unmet(ctx.capabilities()))
        .collect();

    if !unmet.is_empty() {
        for (kind, detail) in unmet {
            log.degrade(kind, format!("skipped, {detail}"));
        }
        return Section {
            data: C::Output::default(),
            warnings: log.into_warnings(),
        };
    }

    let data = collector.collect(ctx, &mut log).await;
    Section {
        data,
        warnings: log.into_warnings(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::context;
    use super::*;
    use crate::adapters::SimulatedCommandExecutor;

    struct NeedsDmidecode;

    #[async_trait]
    impl Collector for NeedsDmidecode {
        type Output = Vec<String>;

        fn section(&self) -> &'static str {
            "gated"
        }

        fn requirements(&self) -> Vec<Requirement> {
            vec![Requirement::Tool("dmidecode"), Requirement::Privilege]
        }

        async fn collect(&self, _ctx: &CollectionContext, _log: &mut SectionLog) -> Vec<String> {
            vec!["ran".to_string()]
        }
    }

    #[tokio::test]
    async fn test_unmet_requirements_skip_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(SimulatedCommandExecutor::new(), dir.path()).await;

        let section = run_collector(&NeedsDmidecode, &ctx).await;
        assert!(section.data.is_empty());
        let kinds: Vec<DegradeKind> = section.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![DegradeKind::ToolMissing, DegradeKind::PermissionDenied]
        );
        assert!(section.warnings.iter().all(|w| w.section == "gated"));
    }

    #[tokio::test]
    async fn test_met_requirements_run_collector() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["dmidecode"])
            .with_privilege(PrivilegeMode::Root);
        let ctx = context(executor, dir.path()).await;

        let section = run_collector(&NeedsDmidecode, &ctx).await;
        assert_eq!(section.data, vec!["ran"]);
        assert!(section.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_privileged_call_without_privilege_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["dmidecode"])
            .with_output("dmidecode -t system", "System Information");
        let ctx = context(executor, dir.path()).await;

        let err = ctx
            .run_privileged("dmidecode", &["-t", "system"])
            .await
            .unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::PermissionDenied);

        let err = ctx.run("lspci", &["-Dnn"]).await.unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::ToolMissing);
    }

    #[tokio::test]
    async fn test_sudo_refusal_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["smartctl"])
            .with_privilege(PrivilegeMode::Elevatable)
            .with_failure("smartctl -i /dev/sda", 1, "sudo: a password is required\n")
            .with_failure("smartctl -i /dev/sdb", 2, "Smartctl open device: /dev/sdb failed\n");
        let ctx = context(executor, dir.path()).await;

        let err = ctx
            .run_privileged("smartctl", &["-i", "/dev/sda"])
            .await
            .unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::PermissionDenied);

        let err = ctx
            .run_privileged("smartctl", &["-i", "/dev/sdb"])
            .await
            .unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::ToolMissing);
    }
}
