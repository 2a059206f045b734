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

//! Capability probing: which external tools exist and how far privilege reaches

use crate::domain::{DomainError, ReportConfig};
use crate::ports::{CommandExecutor, SystemCommand};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hardware RAID vendor tools in priority order; the first present one wins
pub const HARDWARE_RAID_TOOLS: &[&str] = &[
    "storcli64",
    "storcli",
    "perccli64",
    "perccli",
    "ssacli",
    "arcconf",
    "MegaCli64",
];

/// Tools that enrich the report but never fail strict mode
pub const OPTIONAL_TOOLS: &[&str] = &["nvidia-smi", "hdparm"];

/// Privilege level available to collectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeMode {
    /// Process already runs as root
    Root,
    /// `sudo -n` works without prompting
    Elevatable,
    /// Privileged calls are refused
    None,
}

impl fmt::Display for PrivilegeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrivilegeMode::Root => "root",
            PrivilegeMode::Elevatable => "elevatable",
            PrivilegeMode::None => "none",
        };
        f.write_str(label)
    }
}

/// Capability table produced once per run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    /// Tool name -> present
    pub tools: BTreeMap<String, bool>,
    /// Tools whose absence fails strict mode
    pub required: Vec<String>,
    pub privilege: PrivilegeMode,
    /// nvidia-smi advertises the nvswitch subcommand
    pub nvswitch_query: bool,
}

impl Capabilities {
    /// Capability table with every tool absent and no privilege
    pub fn none(required: &[String]) -> Self {
        Self {
            tools: BTreeMap::new(),
            required: required.to_vec(),
            privilege: PrivilegeMode::None,
            nvswitch_query: false,
        }
    }

    pub fn has(&self, tool: &str) -> bool {
        self.tools.get(tool).copied().unwrap_or(false)
    }

    /// Every checked tool that is absent, sorted by name
    pub fn missing(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, present)| !**present)
            .map(|(tool, _)| tool.clone())
            .collect()
    }

    /// Required tools that are absent, in configuration order
    pub fn missing_required(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|tool| !self.has(tool))
            .cloned()
            .collect()
    }

    pub fn can_run_privileged(&self) -> bool {
        self.privilege != PrivilegeMode::None
    }

    /// First hardware RAID tool present, honouring priority order
    pub fn hardware_raid_tool(&self) -> Option<&'static str> {
        HARDWARE_RAID_TOOLS.iter().copied().find(|tool| self.has(tool))
    }

    /// Strict-mode pre-run check
    ///
    /// Missing required tools are reported first and all at once; privilege is
    /// only checked once every required tool is present.
    pub fn check_strict(&self) -> Result<(), DomainError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(DomainError::MissingDependencies(missing));
        }
        if !self.can_run_privileged() {
            return Err(DomainError::InsufficientPrivileges(
                "neither root nor non-interactive sudo is available".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs capability detection against a command executor
pub struct CapabilityDetector {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl CapabilityDetector {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Detect required and optional tools, privilege, and NVSwitch support
    ///
    /// Never fails: a check that errors counts as absent.
    pub async fn detect(&self, config: &ReportConfig) -> Capabilities {
        let mut names: Vec<&str> = config.required_tools.iter().map(String::as_str).collect();
        names.extend(OPTIONAL_TOOLS);
        names.extend(HARDWARE_RAID_TOOLS);

        let mut tools = BTreeMap::new();
        for name in names {
            if tools.contains_key(name) {
                continue;
            }
            let present = self
                .executor
                .is_command_available(name)
                .await
                .unwrap_or(false);
            debug!("tool {name}: {}", if present { "present" } else { "absent" });
            tools.insert(name.to_string(), present);
        }

        let privilege = self.detect_privilege(config.interactive_elevation).await;
        info!("privilege mode: {privilege}");

        let mut capabilities = Capabilities {
            tools,
            required: config.required_tools.clone(),
            privilege,
            nvswitch_query: false,
        };
        if capabilities.has("nvidia-smi") {
            capabilities.nvswitch_query = self.detect_nvswitch().await;
        }
        capabilities
    }

    async fn detect_privilege(&self, interactive: bool) -> PrivilegeMode {
        if self
            .executor
            .has_elevated_privileges()
            .await
            .unwrap_or(false)
        {
            return PrivilegeMode::Root;
        }
        // The only place a password prompt may happen; collectors use sudo -n
        if interactive && !self.executor.prime_elevation().await.unwrap_or(false) {
            debug!("interactive sudo was refused");
        }
        if self
            .executor
            .can_elevate_noninteractively()
            .await
            .unwrap_or(false)
        {
            PrivilegeMode::Elevatable
        } else {
            PrivilegeMode::None
        }
    }

    async fn detect_nvswitch(&self) -> bool {
        let command = SystemCommand::new("nvidia-smi")
            .args(&["nvswitch", "--help"])
            .timeout(self.timeout);
        match self.executor.execute(&command).await {
            Ok(output) => output.success,
            Err(e) => {
                debug!("nvswitch support check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedCommandExecutor;

    fn config() -> ReportConfig {
        ReportConfig::default()
    }

    #[tokio::test]
    async fn test_detect_reports_present_and_absent_tools() {
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["lscpu", "lspci"])
            .with_privilege(PrivilegeMode::Elevatable);
        let detector = CapabilityDetector::new(Arc::new(executor), Duration::from_secs(1));

        let capabilities = detector.detect(&config()).await;

        assert!(capabilities.has("lscpu"));
        assert!(!capabilities.has("dmidecode"));
        assert_eq!(capabilities.privilege, PrivilegeMode::Elevatable);
        assert_eq!(
            capabilities.missing_required(),
            vec!["dmidecode", "smartctl", "udevadm", "mdadm", "ethtool"]
        );
        assert!(capabilities.missing().contains(&"storcli64".to_string()));
        assert!(!capabilities.nvswitch_query);
    }

    #[tokio::test]
    async fn test_nvswitch_support_needs_successful_help() {
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["nvidia-smi"])
            .with_output("nvidia-smi nvswitch --help", "Usage: nvidia-smi nvswitch");
        let detector = CapabilityDetector::new(Arc::new(executor), Duration::from_secs(1));
        assert!(detector.detect(&config()).await.nvswitch_query);

        let executor = SimulatedCommandExecutor::new().with_tools(&["nvidia-smi"]);
        let detector = CapabilityDetector::new(Arc::new(executor), Duration::from_secs(1));
        assert!(!detector.detect(&config()).await.nvswitch_query);
    }

    #[test]
    fn test_strict_check_enumerates_missing_tools() {
        let required: Vec<String> = ["dmidecode", "lspci"].iter().map(|s| s.to_string()).collect();
        let mut capabilities = Capabilities::none(&required);
        capabilities.tools.insert("lspci".into(), true);

        match capabilities.check_strict() {
            Err(DomainError::MissingDependencies(tools)) => assert_eq!(tools, vec!["dmidecode"]),
            other => panic!("unexpected {other:?}"),
        }

        capabilities.tools.insert("dmidecode".into(), true);
        assert!(matches!(
            capabilities.check_strict(),
            Err(DomainError::InsufficientPrivileges(_))
        ));

        capabilities.privilege = PrivilegeMode::Root;
        assert!(capabilities.check_strict().is_ok());
    }

    #[test]
    fn test_hardware_raid_tool_priority() {
        let mut capabilities = Capabilities::none(&[]);
        capabilities.tools.insert("arcconf".into(), true);
        capabilities.tools.insert("perccli".into(), true);
        assert_eq!(capabilities.hardware_raid_tool(), Some("perccli"));
    }
}
