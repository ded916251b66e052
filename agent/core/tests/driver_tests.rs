// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the reconciliation driver.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::FakeHost;
use fleetkeeper_core::application::convergence::ConfigSetReconciler;
use fleetkeeper_core::application::driver::ReconciliationDriver;
use fleetkeeper_core::application::fleet_lock::AnnotationLocker;
use fleetkeeper_core::application::upgrade_scheduler::UpgradeScheduler;
use fleetkeeper_core::domain::agent_config::LockerConfig;
use fleetkeeper_core::domain::clock::SystemClock;
use fleetkeeper_core::domain::config_set::{ConfigSet, ConfigSetSpec, File, Package};
use fleetkeeper_core::domain::node::{
    ManagedNode, NamespacedName, UpgradeSpec, LABEL_ARCH, LABEL_OS,
};
use fleetkeeper_core::domain::repository::NodeRepository;
use fleetkeeper_core::infrastructure::repositories::{
    InMemoryConfigSetRepository, InMemoryNodeRepository, InMemoryReferenceRepository,
};
use fleetkeeper_core::infrastructure::template_engine::HandlebarsRenderer;

struct Fixture {
    host: FakeHost,
    nodes: InMemoryNodeRepository,
    config_sets: InMemoryConfigSetRepository,
    driver: Arc<ReconciliationDriver>,
}

fn fixture() -> Fixture {
    let host = FakeHost::new("host-a");
    let nodes = InMemoryNodeRepository::new();
    let config_sets = InMemoryConfigSetRepository::new();
    let identity = NamespacedName::new("fleet", "host-a");
    let clock = Arc::new(SystemClock);

    let locker = AnnotationLocker::new(Arc::new(nodes.clone()), clock.clone(), LockerConfig::default());
    let scheduler = UpgradeScheduler::new(
        identity.clone(),
        Arc::new(nodes.clone()),
        Arc::new(locker),
        host.system(),
        clock.clone(),
        Duration::from_secs(60),
    );
    let reconciler = ConfigSetReconciler::new(
        host.system(),
        Arc::new(InMemoryReferenceRepository::new()),
        Arc::new(HandlebarsRenderer::new()),
    );
    let driver = ReconciliationDriver::new(
        identity,
        Arc::new(nodes.clone()),
        Arc::new(config_sets.clone()),
        Arc::new(scheduler),
        Arc::new(reconciler),
        host.system(),
        clock,
        Duration::from_secs(30),
    );

    Fixture {
        host,
        nodes,
        config_sets,
        driver: Arc::new(driver),
    }
}

fn motd(name: &str, text: &str) -> ConfigSet {
    ConfigSet::new(
        "fleet",
        name,
        ConfigSetSpec {
            files: vec![File {
                path: format!("/etc/motd.d/{}", name),
                content: text.into(),
                ..Default::default()
            }],
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_ensure_node_registers_host() {
    let f = fixture();

    let node = f.driver.ensure_node().await.unwrap();

    assert_eq!(node.name(), "host-a");
    assert_eq!(node.labels().get(LABEL_OS).map(String::as_str), Some("arch"));
    assert_eq!(node.labels().get(LABEL_ARCH).map(String::as_str), Some("x86_64"));
    assert_eq!(node.status.release, "6.9.7-arch1-1");
    assert!(f.nodes.get(&node.key()).await.is_ok());
}

#[tokio::test]
async fn test_ensure_node_keeps_existing_record() {
    let f = fixture();
    let mut existing = ManagedNode::new("fleet", "host-a");
    existing.spec.domain = "example.net".into();
    f.nodes.create(&existing).await.unwrap();

    let node = f.driver.ensure_node().await.unwrap();

    assert_eq!(node.spec.domain, "example.net");
    assert!(node.labels().is_empty(), "labels are the scheduler's job");
}

#[tokio::test]
async fn test_converge_once_isolates_failing_config_set() {
    let f = fixture();
    f.driver.ensure_node().await.unwrap();

    f.config_sets.insert(motd("alpha", "hello\n"));
    f.config_sets.insert(ConfigSet::new(
        "fleet",
        "broken",
        ConfigSetSpec {
            packages: vec![Package {
                name: "nginx".into(),
                ensure: "sometimes".into(),
            }],
            ..Default::default()
        },
    ));
    f.config_sets.insert(motd("omega", "bye\n"));
    let mut elsewhere = motd("elsewhere", "no\n");
    elsewhere.metadata.namespace = "other".into();
    f.config_sets.insert(elsewhere);

    let summary = f.driver.converge_once().await.unwrap();

    assert_eq!(summary.config_sets, 3);
    assert_eq!(summary.failed, vec!["broken".to_string()]);
    let mut changed = summary.changed_files.clone();
    changed.sort();
    assert_eq!(changed, vec!["/etc/motd.d/alpha", "/etc/motd.d/omega"]);
    assert_eq!(f.host.files.content("/etc/motd.d/omega").as_deref(), Some("bye\n"));

    let again = f.driver.converge_once().await.unwrap();
    assert!(again.changed_files.is_empty());
}

#[tokio::test]
async fn test_converge_once_requires_node_record() {
    let f = fixture();
    f.config_sets.insert(motd("alpha", "hello\n"));

    assert!(f.driver.converge_once().await.is_err());
    assert!(f.host.files.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_marks_ready_and_stops_on_shutdown() {
    let f = fixture();
    f.config_sets.insert(motd("alpha", "hello\n"));
    let readiness = f.driver.readiness();
    assert!(!readiness.is_ready());

    let shutdown = CancellationToken::new();
    let handle = f.driver.clone().start(shutdown.clone());

    for _ in 0..50 {
        if readiness.is_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(readiness.is_ready());
    assert!(f.host.files.content("/etc/motd.d/alpha").is_some());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

/// Register host-a with an upgrade window every minute, then run the driver
/// for two minutes of paused time.
async fn run_with_open_window(f: &Fixture) -> ManagedNode {
    let mut node = ManagedNode::new("fleet", "host-a");
    node.spec.upgrade = UpgradeSpec {
        group: "web".into(),
        schedule: "* * * * *".into(),
        delay: "24h".into(),
    };
    f.nodes.create(&node).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = f.driver.clone().start(shutdown.clone());
    for _ in 0..120 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    f.nodes.get(&node.key()).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reboot_that_never_happens_is_not_recorded_as_completed() {
    let f = fixture();

    let node = run_with_open_window(&f).await;

    assert!(f.host.node.rebooted());
    assert!(node.holds_lock(), "lock stays with the node until it restarts");
    assert_eq!(node.last_upgrade().unwrap(), None);
    assert_eq!(
        f.host.packages.calls().iter().filter(|c| *c == "upgrade_all").count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_upgrade_halts_scheduler_with_lock_held() {
    let f = fixture();
    f.host.packages.fail_upgrade(true);

    let node = run_with_open_window(&f).await;

    assert!(!f.host.node.rebooted());
    assert!(node.holds_lock());
    assert_eq!(node.last_upgrade().unwrap(), None);
    assert_eq!(
        f.host.packages.calls().iter().filter(|c| *c == "upgrade_all").count(),
        1
    );
}
