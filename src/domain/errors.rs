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

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Domain-level errors that don't expose infrastructure details
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Insufficient privileges to collect information
    #[error("Insufficient privileges: {0}")]
    InsufficientPrivileges(String),
    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Required system dependencies missing (strict mode)
    #[error("Missing required dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),
    /// The run was cancelled before every collector finished
    #[error("Collection cancelled")]
    Cancelled,
}

/// Errors specific to the hardware reporting service
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    /// Domain operation failed
    #[error("{0}")]
    Domain(#[from] DomainError),
    /// Rendering the document failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

impl ReportError {
    /// Missing tools when this error came from a strict-mode check
    pub fn missing_dependencies(&self) -> Option<&[String]> {
        match self {
            ReportError::Domain(DomainError::MissingDependencies(tools)) => Some(tools),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReportError::Domain(DomainError::Cancelled))
    }
}

/// Errors raised while writing a rendered report
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Writing to the destination failed
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// System-level errors for adapters (not exposed to domain)
#[derive(Debug, Clone, Error)]
pub enum SystemError {
    /// Command execution failed
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Command not found
    CommandNotFound(String),
    /// Permission denied
    PermissionDenied(String),
    /// I/O operation failed
    IoError(String),
    /// Parsing error
    ParseError(String),
    /// Timeout
    Timeout(String),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                write!(f, "Command '{}' failed", command)?;
                if let Some(code) = exit_code {
                    write!(f, " with exit code {}", code)?;
                }
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            SystemError::CommandNotFound(cmd) => write!(f, "Command not found: {}", cmd),
            SystemError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            SystemError::IoError(msg) => write!(f, "I/O error: {}", msg),
            SystemError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            SystemError::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

/// Command execution errors
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// System error occurred
    #[error("{0}")]
    System(#[from] SystemError),
    /// Command execution failed
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Why a field or record degraded to unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeKind {
    /// A required external tool is not installed
    ToolMissing,
    /// Privilege elevation unavailable or refused
    PermissionDenied,
    /// Expected field absent from otherwise-successful output
    ParseMiss,
    /// External call exceeded its bound
    Timeout,
}

impl fmt::Display for DegradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DegradeKind::ToolMissing => "tool missing",
            DegradeKind::PermissionDenied => "permission denied",
            DegradeKind::ParseMiss => "parse miss",
            DegradeKind::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

impl From<&CommandError> for DegradeKind {
    fn from(err: &CommandError) -> Self {
        match err {
            CommandError::System(SystemError::CommandNotFound(_)) => DegradeKind::ToolMissing,
            CommandError::System(SystemError::PermissionDenied(_)) => {
                DegradeKind::PermissionDenied
            }
            CommandError::System(SystemError::Timeout(_)) => DegradeKind::Timeout,
            CommandError::System(SystemError::ParseError(_)) => DegradeKind::ParseMiss,
            // A tool that ran but failed is treated like a missing one for that call
            _ => DegradeKind::ToolMissing,
        }
    }
}

/// A degrade-to-unknown outcome, reported on the diagnostic channel only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Section that degraded (e.g. "memory", "storage")
    pub section: String,
    /// Taxonomy bucket
    pub kind: DegradeKind,
    /// Human-readable detail
    pub detail: String,
}

impl Warning {
    pub fn new(section: &str, kind: DegradeKind, detail: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.section, self.kind, self.detail)
    }
}
