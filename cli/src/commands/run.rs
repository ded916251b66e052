// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! `fleetkeeper run`
//!
//! Wires the OS adapters, the record store and the coordination services
//! together, then runs the reconciliation driver next to the probe server
//! and the Prometheus exporter until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fleetkeeper_core::application::{
    AnnotationLocker, ConfigSetReconciler, ReconciliationDriver, UpgradeScheduler,
};
use fleetkeeper_core::domain::agent_config::{AgentConfig, StoreKind};
use fleetkeeper_core::domain::clock::SystemClock;
use fleetkeeper_core::domain::node::NamespacedName;
use fleetkeeper_core::domain::repository::{ConfigSetRepository, NodeRepository, ReferenceRepository};
use fleetkeeper_core::infrastructure::repositories::control_plane::ControlPlaneRepository;
use fleetkeeper_core::infrastructure::repositories::{
    InMemoryConfigSetRepository, InMemoryNodeRepository, InMemoryReferenceRepository,
};
use fleetkeeper_core::infrastructure::{detect_system, HandlebarsRenderer};
use fleetkeeper_core::presentation::serve_probes;

struct Stores {
    nodes: Arc<dyn NodeRepository>,
    config_sets: Arc<dyn ConfigSetRepository>,
    references: Arc<dyn ReferenceRepository>,
}

async fn build_stores(config: &AgentConfig) -> Result<Stores> {
    match config.store.kind {
        StoreKind::ControlPlane => {
            let store = Arc::new(
                ControlPlaneRepository::from_config(&config.store)
                    .await
                    .context("Failed to configure control-plane store")?,
            );
            Ok(Stores {
                nodes: store.clone(),
                config_sets: store.clone(),
                references: store,
            })
        }
        StoreKind::InMemory => Ok(Stores {
            nodes: Arc::new(InMemoryNodeRepository::new()),
            config_sets: Arc::new(InMemoryConfigSetRepository::new()),
            references: Arc::new(InMemoryReferenceRepository::new()),
        }),
    }
}

pub async fn execute(config: AgentConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let system = detect_system().await.context("Failed to detect host OS")?;
    let node_name = config.resolve_node_name(system.node.as_ref())?;
    let identity = NamespacedName::new(&config.namespace, node_name);
    info!(node = %identity, store = ?config.store.kind, "Starting fleetkeeper agent");

    if let Some(address) = &config.observability.metrics_address {
        let address: SocketAddr = address
            .parse()
            .with_context(|| format!("Invalid metrics address: {}", address))?;
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", address);
    }

    let stores = build_stores(&config).await?;
    let clock = Arc::new(SystemClock);

    let locker = AnnotationLocker::new(stores.nodes.clone(), clock.clone(), config.locker.clone());
    let scheduler = UpgradeScheduler::new(
        identity.clone(),
        stores.nodes.clone(),
        Arc::new(locker),
        system.clone(),
        clock.clone(),
        config.upgrade.forgiveness_period,
    );
    let reconciler = ConfigSetReconciler::new(
        system.clone(),
        stores.references.clone(),
        Arc::new(HandlebarsRenderer::new()),
    );
    let driver = Arc::new(ReconciliationDriver::new(
        identity,
        stores.nodes,
        stores.config_sets,
        Arc::new(scheduler),
        Arc::new(reconciler),
        system,
        clock,
        config.reconcile_interval,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let probes = tokio::spawn({
        let bind_address = config.probes.bind_address.clone();
        let readiness = driver.readiness();
        let shutdown = shutdown.clone();
        async move { serve_probes(&bind_address, readiness, shutdown).await }
    });

    let result = driver
        .start(shutdown.clone())
        .await
        .context("Reconciliation driver task failed")?;

    shutdown.cancel();
    match probes.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Probe server stopped with error: {:#}", e),
        Err(e) => error!("Probe server task failed: {}", e),
    }

    info!("fleetkeeper agent stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
