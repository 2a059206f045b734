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

//! Scripted command executor for tests and for replaying captured tool output

use crate::domain::{CommandError, PrivilegeMode, SystemError};
use crate::ports::{CommandExecutor, CommandOutput, SystemCommand};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct ScriptedReply {
    output: CommandOutput,
    delay: Option<Duration>,
}

/// One captured command in a replay script
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedCommand {
    /// Program and arguments joined by single spaces
    pub line: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Replay script as stored on disk (TOML)
///
/// ```toml
/// tools = ["lscpu", "lspci"]
/// privilege = "root"
///
/// [[command]]
/// line = "lscpu"
/// stdout = "Architecture: x86_64\n"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_privilege")]
    pub privilege: String,
    #[serde(default, rename = "command")]
    pub commands: Vec<ScriptedCommand>,
}

fn default_privilege() -> String {
    "none".to_string()
}

/// Command executor answering from a script keyed by command line
///
/// Tools not registered as present fail with `CommandNotFound`; present tools
/// without a scripted reply exit 1 with empty output.
#[derive(Debug)]
pub struct SimulatedCommandExecutor {
    tools: BTreeSet<String>,
    privilege: PrivilegeMode,
    replies: HashMap<String, ScriptedReply>,
    calls: Mutex<Vec<String>>,
}

impl Default for SimulatedCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCommandExecutor {
    /// A host with no tools and no privilege
    pub fn new() -> Self {
        Self {
            tools: BTreeSet::new(),
            privilege: PrivilegeMode::None,
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools.extend(tools.iter().map(|tool| tool.to_string()));
        self
    }

    pub fn with_privilege(mut self, privilege: PrivilegeMode) -> Self {
        self.privilege = privilege;
        self
    }

    /// Successful reply for an exact command line
    pub fn with_output(self, line: &str, stdout: &str) -> Self {
        self.with_reply(line, stdout, "", 0)
    }

    /// Failing reply for an exact command line
    pub fn with_failure(self, line: &str, exit_code: i32, stderr: &str) -> Self {
        self.with_reply(line, "", stderr, exit_code)
    }

    fn with_reply(mut self, line: &str, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.replies.insert(
            line.to_string(),
            ScriptedReply {
                output: CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code: Some(exit_code),
                    success: exit_code == 0,
                },
                delay: None,
            },
        );
        self
    }

    /// Make a command hang for `delay` before answering
    pub fn with_delay(mut self, line: &str, delay: Duration) -> Self {
        let reply = self
            .replies
            .entry(line.to_string())
            .or_insert_with(|| ScriptedReply {
                output: CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(0),
                    success: true,
                },
                delay: None,
            });
        reply.delay = Some(delay);
        self
    }

    /// Build an executor from a parsed replay script
    pub fn from_script(script: ReplayScript) -> Result<Self, CommandError> {
        let privilege = match script.privilege.as_str() {
            "root" => PrivilegeMode::Root,
            "elevatable" => PrivilegeMode::Elevatable,
            "none" => PrivilegeMode::None,
            other => {
                return Err(CommandError::InvalidArguments(format!(
                    "unknown privilege mode '{other}'"
                )))
            }
        };

        let tools: Vec<&str> = script.tools.iter().map(String::as_str).collect();
        let mut executor = Self::new().with_tools(&tools).with_privilege(privilege);
        for command in &script.commands {
            executor = executor.with_reply(
                &command.line,
                &command.stdout,
                &command.stderr,
                command.exit_code,
            );
        }
        Ok(executor)
    }

    /// Parse a TOML replay script
    pub fn from_toml_str(content: &str) -> Result<Self, CommandError> {
        let script: ReplayScript = toml::from_str(content).map_err(|e| {
            CommandError::System(SystemError::ParseError(format!("replay script: {e}")))
        })?;
        Self::from_script(script)
    }

    /// Command lines executed so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    async fn answer(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        let line = command.command_line();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        if !self.tools.contains(&command.program) {
            return Err(SystemError::CommandNotFound(command.program.clone()).into());
        }

        match self.replies.get(&line) {
            Some(reply) => {
                if let Some(delay) = reply.delay {
                    match command.timeout {
                        Some(limit) if limit < delay => {
                            tokio::time::sleep(limit).await;
                            return Err(SystemError::Timeout(format!(
                                "'{line}' timed out after {limit:?}"
                            ))
                            .into());
                        }
                        _ => tokio::time::sleep(delay).await,
                    }
                }
                Ok(reply.output.clone())
            }
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("no scripted output for '{line}'"),
                exit_code: Some(1),
                success: false,
            }),
        }
    }
}

#[async_trait]
impl CommandExecutor for SimulatedCommandExecutor {
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        self.answer(command).await
    }

    async fn execute_with_privileges(
        &self,
        command: &SystemCommand,
    ) -> Result<CommandOutput, CommandError> {
        if self.privilege == PrivilegeMode::None {
            return Err(SystemError::PermissionDenied(format!(
                "sudo: a password is required for {}",
                command.program
            ))
            .into());
        }
        self.answer(command).await
    }

    async fn is_command_available(&self, command_name: &str) -> Result<bool, CommandError> {
        Ok(self.tools.contains(command_name))
    }

    async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
        Ok(self.privilege == PrivilegeMode::Root)
    }

    async fn can_elevate_noninteractively(&self) -> Result<bool, CommandError> {
        Ok(self.privilege == PrivilegeMode::Elevatable)
    }

    async fn prime_elevation(&self) -> Result<bool, CommandError> {
        Ok(self.privilege != PrivilegeMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DegradeKind;

    #[tokio::test]
    async fn test_scripted_and_unscripted_replies() {
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["lscpu"])
            .with_output("lscpu", "Architecture: x86_64\n");

        let output = executor.execute(&SystemCommand::new("lscpu")).await.unwrap();
        assert!(output.success);

        let output = executor
            .execute(&SystemCommand::new("lscpu").args(&["-e"]))
            .await
            .unwrap();
        assert!(!output.success);

        let err = executor
            .execute(&SystemCommand::new("lspci"))
            .await
            .unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::ToolMissing);
        assert_eq!(executor.calls(), vec!["lscpu", "lscpu -e", "lspci"]);
    }

    #[tokio::test]
    async fn test_delay_beyond_timeout_times_out() {
        let executor = SimulatedCommandExecutor::new()
            .with_tools(&["ethtool"])
            .with_delay("ethtool -i eth0", Duration::from_secs(60));

        let command = SystemCommand::new("ethtool")
            .args(&["-i", "eth0"])
            .timeout(Duration::from_millis(10));
        let err = executor.execute(&command).await.unwrap_err();
        assert_eq!(DegradeKind::from(&err), DegradeKind::Timeout);
    }

    #[test]
    fn test_replay_script() {
        let executor = SimulatedCommandExecutor::from_toml_str(
            r#"
tools = ["dmidecode"]
privilege = "elevatable"

[[command]]
line = "dmidecode -t system"
stdout = "System Information\n"
"#,
        )
        .unwrap();
        assert_eq!(executor.privilege, PrivilegeMode::Elevatable);
        assert!(executor.replies.contains_key("dmidecode -t system"));

        assert!(SimulatedCommandExecutor::from_toml_str("privilege = \"admin\"").is_err());
    }
}
