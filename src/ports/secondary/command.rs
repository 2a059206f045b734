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

use crate::domain::CommandError;
use async_trait::async_trait;
use std::time::Duration;

/// Represents a system command to be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCommand {
    /// Command program name
    pub program: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Execution timeout
    pub timeout: Option<Duration>,
}

impl SystemCommand {
    /// Create a new system command
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Add arguments to the command
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set execution timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined by spaces, used for logs and scripted replies
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Command execution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status code
    pub exit_code: Option<i32>,
    /// Whether command was successful
    pub success: bool,
}

impl CommandOutput {
    /// `sudo -n` declined to run the command because it would have to prompt
    pub fn sudo_refused(&self) -> bool {
        !self.success
            && self.stdout.trim().is_empty()
            && self.stderr.lines().any(|line| {
                line.starts_with("sudo:")
                    && (line.contains("password is required")
                        || line.contains("a terminal is required"))
            })
    }
}

/// Secondary port - Command execution abstraction
///
/// This interface abstracts system command execution, allowing for different
/// implementations (direct execution, scripted replay for testing, etc.)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a system command
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - Command output and status (including non-zero exits)
    /// * `Err(CommandError)` - The command could not run or timed out
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError>;

    /// Execute a command through non-interactive sudo
    async fn execute_with_privileges(
        &self,
        command: &SystemCommand,
    ) -> Result<CommandOutput, CommandError>;

    /// Check if a command is available on the system
    async fn is_command_available(&self, command_name: &str) -> Result<bool, CommandError>;

    /// Check if running with elevated privileges (root)
    async fn has_elevated_privileges(&self) -> Result<bool, CommandError>;

    /// Check if sudo works without prompting (cached credential or NOPASSWD)
    async fn can_elevate_noninteractively(&self) -> Result<bool, CommandError>;

    /// Establish the sudo credential cache, prompting once if needed
    async fn prime_elevation(&self) -> Result<bool, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
            success: false,
        }
    }

    #[test]
    fn test_sudo_refusal_is_recognised() {
        assert!(failed("sudo: a password is required\n").sudo_refused());
        assert!(failed("sudo: a terminal is required to read the password\n").sudo_refused());
        assert!(!failed("smartctl: open device failed\n").sudo_refused());
    }

    #[test]
    fn test_command_line_joins_args() {
        let command = SystemCommand::new("smartctl").args(&["-i", "/dev/sda"]);
        assert_eq!(command.command_line(), "smartctl -i /dev/sda");
    }
}
