// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Host inspection commands
//!
//! Commands: info

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use fleetkeeper_core::infrastructure::detect_system;

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Show detected OS identity and the labels published for this host
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: NodeCommand) -> Result<()> {
    match command {
        NodeCommand::Info { json } => info(json).await,
    }
}

async fn info(json: bool) -> Result<()> {
    let system = detect_system().await.context("Failed to detect host OS")?;
    let info = system.node.info().await.context("Failed to read host identity")?;
    let labels = info.labels();

    if json {
        let report = serde_json::json!({
            "os_id": info.os_id,
            "os_release": info.os_release,
            "arch": info.arch,
            "hostname": info.hostname,
            "labels": labels,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Host:".bold());
    println!("  OS:       {}", info.os_id);
    println!("  Release:  {}", info.os_release);
    println!("  Arch:     {}", info.arch);
    println!("  Hostname: {}", info.hostname);
    println!();
    println!("{}", "Labels:".bold());
    for (key, value) in &labels {
        println!("  {}={}", key, value);
    }

    Ok(())
}
