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

use clap::{Parser, ValueEnum};
use hardware_inventory::domain::Capabilities;
use hardware_inventory::{
    render, CancellationToken, ContainerConfigBuilder, DomainError, OutputFormat, ReportConfig,
    ReportError, ServiceContainer,
};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const EXIT_STRICT: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Column-aligned tables
    Text,
    /// Flat JSON: system, cpu, ram, storage, pci, gpus, interconnects
    Json,
    /// Hierarchical JSON: hardware{...} plus interconnects
    JsonTree,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::JsonTree => OutputFormat::JsonTree,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hardware_inventory")]
#[command(about = "Inventory the hardware of a Linux host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Opt {
    /// Output format (defaults to the config file value, else text)
    #[arg(long, short = 'f', value_enum)]
    format: Option<Format>,

    /// Fail before collecting when a required tool or privilege is missing
    #[arg(long)]
    strict: bool,

    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Write the report to this file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the capability table and exit
    #[arg(long)]
    check: bool,

    /// Per-call timeout for external tools, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Resolve sysfs/procfs paths under this directory
    #[arg(long)]
    host_root: Option<PathBuf>,

    /// Let sudo prompt once for a password before collection starts
    #[arg(long)]
    ask_sudo: bool,

    /// Replay captured tool output from a TOML script instead of running tools
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opt {
    /// CLI flags take precedence over the config file
    fn apply(&self, mut config: ReportConfig) -> ReportConfig {
        if self.strict {
            config.strict = true;
        }
        if self.ask_sudo {
            config.interactive_elevation = true;
        }
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if let Some(timeout) = self.timeout {
            config.command_timeout_secs = timeout.max(1);
        }
        if let Some(root) = &self.host_root {
            config.host_root = root.clone();
        }
        config
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

fn print_capabilities(capabilities: &Capabilities) {
    println!("Capabilities:");
    println!("=============");
    let width = capabilities
        .tools
        .keys()
        .map(String::len)
        .max()
        .unwrap_or(0);
    for (tool, present) in &capabilities.tools {
        let required = if capabilities.required.contains(tool) {
            " (required)"
        } else {
            ""
        };
        let state = if *present { "present" } else { "absent" };
        println!("  {tool:<width$}  {state}{required}");
    }
    println!("Privilege: {}", capabilities.privilege);
    println!(
        "NVSwitch query: {}",
        if capabilities.nvswitch_query { "supported" } else { "unsupported" }
    );
}

/// Map a failed run onto the process exit status
fn exit_for(err: &ReportError) -> ExitCode {
    if let Some(tools) = err.missing_dependencies() {
        eprintln!("Missing required tools:");
        for tool in tools {
            eprintln!("  {tool}");
        }
        return ExitCode::from(EXIT_STRICT);
    }
    if err.is_cancelled() {
        eprintln!("Cancelled");
        return ExitCode::from(EXIT_CANCELLED);
    }
    if let ReportError::Domain(DomainError::InsufficientPrivileges(_)) = err {
        eprintln!("{err}");
        return ExitCode::from(EXIT_STRICT);
    }
    error!("{err}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    let base = ServiceContainer::new(ContainerConfigBuilder::new().build());
    let config = match base
        .create_configuration_provider(opt.config.clone())
        .get_report_config()
        .await
    {
        Ok(config) => opt.apply(config),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let container = ServiceContainer::new(
        ContainerConfigBuilder::new()
            .command_timeout(Duration::from_secs(config.command_timeout_secs))
            .host_root(config.host_root.clone())
            .replay_script(opt.replay.clone())
            .output_path(opt.output.clone())
            .build(),
    );
    let service = match container.create_hardware_reporting_service() {
        Ok(service) => service,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if opt.check {
        let capabilities = match service.detect_capabilities(&config).await {
            Ok(capabilities) => capabilities,
            Err(e) => return exit_for(&e),
        };
        print_capabilities(&capabilities);
        if config.strict {
            if let Err(e) = capabilities.check_strict() {
                return exit_for(&ReportError::from(e));
            }
        }
        return ExitCode::SUCCESS;
    }

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let format = config.format;
    let outcome = match service.generate_report_cancellable(config, token).await {
        Ok(outcome) => outcome,
        Err(e) => return exit_for(&e),
    };
    info!(
        "{} warning(s), privilege mode {}",
        outcome.warnings.len(),
        outcome.capabilities.privilege
    );

    let rendered = match render(&outcome.document, format) {
        Ok(rendered) => rendered,
        Err(e) => return exit_for(&e),
    };
    if let Err(e) = container.create_data_publisher().publish(&rendered).await {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    if let Some(path) = &opt.output {
        info!("report written to {}", path.display());
    }
    ExitCode::SUCCESS
}
