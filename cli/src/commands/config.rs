// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fleetkeeper_core::domain::agent_config::{AgentConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./fleetkeeper.yaml)
        #[arg(short, long, default_value = "./fleetkeeper.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = AgentConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./fleetkeeper.yaml");
        println!("  4. ~/.fleetkeeper/config.yaml");
        println!("  5. /etc/fleetkeeper/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Namespace: {}", config.namespace);
    println!(
        "  Name: {}",
        config.node_name.as_deref().unwrap_or("(hostname)")
    );
    println!(
        "  Reconcile interval: {}",
        humantime_fmt(config.reconcile_interval)
    );
    println!(
        "  Upgrade forgiveness: {}",
        humantime_fmt(config.upgrade.forgiveness_period)
    );
    println!();

    println!("{}", "Fleet lock:".bold());
    println!(
        "  Backoff: {} .. {}",
        humantime_fmt(config.locker.backoff_min),
        humantime_fmt(config.locker.backoff_max)
    );
    println!("  Lock timeout: {}", humantime_fmt(config.locker.lock_timeout));
    println!("  Unlock timeout: {}", humantime_fmt(config.locker.unlock_timeout));
    println!();

    println!("{}", "Store:".bold());
    println!("  Kind: {:?}", config.store.kind);
    println!(
        "  API URL: {}",
        config.store.api_url.as_deref().unwrap_or("(none)")
    );
    println!("  Resources: {}/{}", config.store.group, config.store.version);
    println!();

    println!("{}", "Observability:".bold());
    println!("  Probes: {}", config.probes.bind_address);
    println!(
        "  Logging: {} ({})",
        config.observability.log_level, config.observability.log_format
    );
    println!(
        "  Metrics: {}",
        config.observability.metrics_address.as_deref().unwrap_or("(disabled)")
    );
    println!();

    Ok(())
}

fn humantime_fmt(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s >= 3600 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = AgentConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sample_configs_parse_and_validate() {
        for sample in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = AgentConfig::from_yaml_str(sample).unwrap();
            config.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_writes_sample() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fleetkeeper.yaml");
        generate(output.clone(), false).await.unwrap();
        assert!(AgentConfig::from_yaml_file(&output).is_ok());
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(humantime_fmt(Duration::from_secs(3 * 3600)), "3h");
        assert_eq!(humantime_fmt(Duration::from_secs(180)), "3m");
        assert_eq!(humantime_fmt(Duration::from_secs(90)), "90s");
    }
}
