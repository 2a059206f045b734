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

//! TOML configuration file provider

use crate::domain::{DomainError, ReportConfig};
use crate::ports::ConfigurationProvider;
use async_trait::async_trait;
use std::path::PathBuf;

/// Loads `ReportConfig` from a TOML file; absent keys keep their defaults
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    path: Option<PathBuf>,
}

impl TomlConfigProvider {
    /// Provider reading `path`, or plain defaults when `None`
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn parse(content: &str) -> Result<ReportConfig, DomainError> {
        let config: ReportConfig = toml::from_str(content)
            .map_err(|e| DomainError::InvalidConfiguration(e.to_string()))?;
        if config.command_timeout_secs == 0 {
            return Err(DomainError::InvalidConfiguration(
                "command_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

#[async_trait]
impl ConfigurationProvider for TomlConfigProvider {
    async fn get_report_config(&self) -> Result<ReportConfig, DomainError> {
        let Some(path) = &self.path else {
            return Ok(ReportConfig::default());
        };
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DomainError::InvalidConfiguration(format!("{}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }
}
