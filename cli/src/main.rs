// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! # fleetkeeper host agent
//!
//! The `fleetkeeper` binary runs on every managed host. It converges the
//! host toward the ConfigSets of its namespace and takes part in the
//! group-scoped rolling upgrade protocol.
//!
//! ## Commands
//!
//! - `fleetkeeper run` - Start the reconciliation driver, probes and metrics
//! - `fleetkeeper apply <FILE>` - Converge one local ConfigSet once
//! - `fleetkeeper node info` - Show the detected OS identity
//! - `fleetkeeper config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fleetkeeper_core::domain::agent_config::{AgentConfig, CONFIG_PATH_ENV};

mod commands;

use commands::{ApplyArgs, ConfigCommand, NodeCommand};

/// fleetkeeper - Fleet configuration and coordinated upgrades
#[derive(Parser)]
#[command(name = "fleetkeeper")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file value
    #[arg(long, global = true, env = "FLEETKEEPER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until interrupted
    #[command(name = "run")]
    Run,

    /// Converge a local ConfigSet file once against this host
    #[command(name = "apply")]
    Apply(ApplyArgs),

    /// Host inspection
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config, cli.log_level)?;
            commands::run::execute(config).await
        }
        Commands::Apply(args) => {
            let config = load_config(cli.config, cli.log_level)?;
            commands::apply::execute(args, config).await
        }
        Commands::Node { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "text")?;
            commands::node::handle_command(command).await
        }
        Commands::Config { command } => {
            // Config commands report load errors themselves.
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Load the agent configuration and initialize logging from it. The
/// `--log-level` flag wins over the configured level.
fn load_config(path: Option<PathBuf>, log_level: Option<String>) -> Result<AgentConfig> {
    let config = AgentConfig::load_or_default(path).context("Failed to load configuration")?;
    let level = log_level.unwrap_or_else(|| config.observability.log_level.clone());
    init_logging(&level, &config.observability.log_format)?;
    Ok(config)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
