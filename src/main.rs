// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Main entry point for the mcp-gateway binary
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use mcp_gateway::config::{default_config_path, GatewayConfig, LogFormat, LoggingConfig};
use mcp_gateway::engine_core::audit::read_entries;
use mcp_gateway::Gateway;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway around a stdio MCP server
    Stdio {
        /// Path to a configuration file (JSON or YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Server label used in logs and audit records
        #[arg(short, long)]
        name: Option<String>,

        /// Server command and its arguments
        #[arg(last = true, required = true)]
        server: Vec<String>,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent audit records
    Audit {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only records for this server label
        #[arg(long)]
        server: Option<String>,

        /// Only records for this JSON-RPC method
        #[arg(long)]
        method: Option<String>,

        /// Only blocked messages
        #[arg(long)]
        blocked: bool,

        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,

        /// Pretty-print each record
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration, including the built-in rules
    Init {
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load a configuration file and report its rules
    Validate { path: PathBuf },
    /// Print the effective configuration
    Show {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_panic_hook();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stdio {
            config,
            name,
            server,
        } => {
            let code = run_stdio(config, name, server).await?;
            std::process::exit(code);
        }
        Commands::Config { action } => run_config(action),
        Commands::Audit {
            config,
            server,
            method,
            blocked,
            lines,
            pretty,
        } => run_audit(config, server, method, blocked, lines, pretty),
    }
}

async fn run_stdio(
    config_path: Option<PathBuf>,
    name: Option<String>,
    server: Vec<String>,
) -> anyhow::Result<i32> {
    let (config, source) =
        GatewayConfig::resolve(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let Some((command, args)) = server.split_first() else {
        bail!("Missing server command");
    };
    let mut gateway = Gateway::from_config(&config, command, args.to_vec(), name)
        .context("Failed to initialise gateway")?;
    let code = gateway
        .run()
        .await
        .with_context(|| format!("Failed to run server '{}'", command))?;
    Ok(code)
}

fn run_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { output, force } => {
            let path = output.unwrap_or_else(default_config_path);
            GatewayConfig::with_default_rules()
                .write_to(&path, force)
                .context("Failed to write configuration")?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Validate { path } => {
            let config = match GatewayConfig::load(&path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Invalid configuration: {}", e);
                    std::process::exit(1);
                }
            };
            let rules = config.build_rules();
            println!("Configuration OK: {}", path.display());
            println!(
                "Rules: {} compiled ({} enabled), {} rejected",
                rules.len(),
                rules.enabled_count(),
                rules.rejected().len()
            );
            for rule in rules.rules() {
                println!(
                    "  {:<20} {:<7} {:<9} {}",
                    rule.name,
                    rule.action,
                    rule.severity,
                    if rule.enabled { "" } else { "(disabled)" }
                );
            }
            for rejected in rules.rejected() {
                println!("  rejected: {}", rejected);
            }
        }
        ConfigAction::Show { config } => {
            let (config, _) = GatewayConfig::resolve(config.as_deref())
                .context("Failed to load configuration")?;
            println!("{}", config.to_json_pretty()?);
        }
    }
    Ok(())
}

fn run_audit(
    config_path: Option<PathBuf>,
    server: Option<String>,
    method: Option<String>,
    blocked: bool,
    lines: usize,
    pretty: bool,
) -> anyhow::Result<()> {
    let (config, _) =
        GatewayConfig::resolve(config_path.as_deref()).context("Failed to load configuration")?;
    let path = &config.auditing.audit_log;
    if !path.exists() {
        println!("No audit log at {}", path.display());
        return Ok(());
    }

    let entries = read_entries(path)
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    let selected: Vec<_> = entries
        .into_iter()
        .filter(|e| server.as_deref().map_or(true, |s| e.server == s))
        .filter(|e| method.as_deref().map_or(true, |m| e.method.as_deref() == Some(m)))
        .filter(|e| !blocked || e.blocked)
        .collect();

    let skip = selected.len().saturating_sub(lines);
    for entry in &selected[skip..] {
        let line = if pretty {
            serde_json::to_string_pretty(entry)?
        } else {
            serde_json::to_string(entry)?
        };
        println!("{}", line);
    }
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = if config.enabled {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.level.as_filter()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("off")
    };

    // stdout carries the protocol stream; logs always go to stderr.
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Text => subscriber.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to init tracing: {}", e);
    }
}
