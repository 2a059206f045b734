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

//! Dependency injection container for hardware inventory services

use crate::adapters::{
    FilePublisher, RootedFilesystem, SimulatedCommandExecutor, StdoutPublisher,
    TomlConfigProvider, UnixCommandExecutor,
};
use crate::domain::HardwareCollectionService;
use crate::ports::{
    CommandExecutor, ConfigurationProvider, DataPublisher, HardwareReportingService,
    HostFilesystem,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the dependency injection container
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Default command execution timeout
    pub command_timeout: Duration,
    /// Root that sysfs/procfs paths resolve under
    pub host_root: PathBuf,
    /// Replay captured tool output instead of running tools
    pub replay_script: Option<PathBuf>,
    /// Write the report here instead of stdout
    pub output_path: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(15),
            host_root: PathBuf::from("/"),
            replay_script: None,
            output_path: None,
        }
    }
}

impl ContainerConfig {
    /// True when tools and sysfs both describe the machine this process runs on
    pub fn is_live_host(&self) -> bool {
        self.replay_script.is_none() && self.host_root == Path::new("/")
    }
}

/// Dependency injection container
pub struct ServiceContainer {
    config: ContainerConfig,
}

impl ServiceContainer {
    /// Create a new service container with configuration
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Create the command executor: a replay script when configured, else real processes
    pub fn create_command_executor(&self) -> Result<Arc<dyn CommandExecutor>, Box<dyn Error>> {
        if let Some(script) = &self.config.replay_script {
            let content = std::fs::read_to_string(script)
                .map_err(|e| format!("Failed to read replay script {}: {}", script.display(), e))?;
            return Ok(Arc::new(SimulatedCommandExecutor::from_toml_str(&content)?));
        }

        if !cfg!(target_os = "linux") {
            return Err("Unsupported operating system".into());
        }
        Ok(Arc::new(UnixCommandExecutor::new(self.config.command_timeout)))
    }

    /// Create the host filesystem reader
    pub fn create_filesystem(&self) -> Arc<dyn HostFilesystem> {
        Arc::new(RootedFilesystem::new(&self.config.host_root))
    }

    /// Create the data publisher
    pub fn create_data_publisher(&self) -> Arc<dyn DataPublisher> {
        match &self.config.output_path {
            Some(path) => Arc::new(FilePublisher::new(path)),
            None => Arc::new(StdoutPublisher),
        }
    }

    /// Create the configuration provider
    pub fn create_configuration_provider(
        &self,
        config_file: Option<PathBuf>,
    ) -> Arc<dyn ConfigurationProvider> {
        Arc::new(TomlConfigProvider::new(config_file))
    }

    /// Create the complete hardware reporting service
    pub fn create_hardware_reporting_service(
        &self,
    ) -> Result<Arc<dyn HardwareReportingService>, Box<dyn Error>> {
        let executor = self.create_command_executor()?;
        let filesystem = self.create_filesystem();
        Ok(Arc::new(
            HardwareCollectionService::new(executor, filesystem)
                .with_live_host(self.config.is_live_host()),
        ))
    }
}

/// Builder pattern for container configuration
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
        }
    }

    /// Set command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the filesystem root
    pub fn host_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.host_root = root.into();
        self
    }

    /// Replay tool output from a script
    pub fn replay_script(mut self, script: Option<PathBuf>) -> Self {
        self.config.replay_script = script;
        self
    }

    /// Write output to a file
    pub fn output_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.output_path = path;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContainerConfig {
        self.config
    }
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
