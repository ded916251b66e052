// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! `fleetkeeper apply`
//!
//! One-shot convergence of a local ConfigSet file against this host, without
//! a control plane. Referenced Secrets and ConfigMaps are not available.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use fleetkeeper_core::application::{ConfigSetReconciler, ConvergenceError};
use fleetkeeper_core::domain::agent_config::AgentConfig;
use fleetkeeper_core::domain::config_set::ConfigSet;
use fleetkeeper_core::domain::node::ManagedNode;
use fleetkeeper_core::infrastructure::repositories::InMemoryReferenceRepository;
use fleetkeeper_core::infrastructure::{detect_system, HandlebarsRenderer};

#[derive(Args)]
pub struct ApplyArgs {
    /// ConfigSet manifest (YAML)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Extra node label used for selector matching and templates
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    labels: Vec<(String, String)>,
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

pub async fn execute(args: ApplyArgs, config: AgentConfig) -> Result<()> {
    let manifest = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {:?}", args.file))?;
    let mut config_set: ConfigSet = serde_yaml::from_str(&manifest)
        .with_context(|| format!("Failed to parse ConfigSet from {:?}", args.file))?;
    if config_set.metadata.namespace.is_empty() {
        config_set.metadata.namespace = config.namespace.clone();
    }

    let system = detect_system().await.context("Failed to detect host OS")?;
    let host = system.node.info().await.context("Failed to read host identity")?;

    let node_name = config.resolve_node_name(system.node.as_ref())?;
    let mut node = ManagedNode::new(&config_set.metadata.namespace, node_name);
    node.metadata.labels = host.labels();
    node.metadata.labels.extend(args.labels);
    node.status.release = host.os_release;

    info!(
        configset = %config_set.metadata.name,
        node = node.name(),
        "Applying ConfigSet"
    );

    let reconciler = ConfigSetReconciler::new(
        system,
        Arc::new(InMemoryReferenceRepository::new()),
        Arc::new(HandlebarsRenderer::new()),
    );

    match reconciler.reconcile(&config_set, &node).await {
        Ok(changed) => {
            print_changed(&changed);
            Ok(())
        }
        Err(ConvergenceError::Triggers {
            changed_files,
            failures,
        }) => {
            print_changed(&changed_files);
            for failure in &failures {
                eprintln!("{} {}", "✗".red(), failure);
            }
            anyhow::bail!("{} trigger(s) failed", failures.len())
        }
        Err(e) => Err(e).context("ConfigSet reconciliation failed"),
    }
}

fn print_changed(changed: &[String]) {
    if changed.is_empty() {
        println!("{}", "✓ Host already converged".green());
        return;
    }
    println!("{}", "Changed files:".bold());
    for path in changed {
        println!("  {}", path);
    }
}
