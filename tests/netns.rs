//! Builds real namespaces. Needs root and iproute2; skipped otherwise.

use std::process::Command;
use std::sync::Arc;
use transport_bench::logging::Logger;
use transport_bench::models::Config;
use transport_bench::process::{ExecTarget, NetnsSubstrate, ProcessSupervisor, RunOptions};
use transport_bench::shaper::{KernelVersion, TrafficShaper};
use transport_bench::topology::{PathParams, Topology};
use transport_bench::types::TopologyKind;

fn can_manage_namespaces() -> bool {
    let root = Command::new("id")
        .arg("-u")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
        .unwrap_or(false);
    let has_ip = Command::new("ip").arg("-V").output().map(|o| o.status.success()).unwrap_or(false);
    root && has_ip
}

fn namespaces() -> String {
    Command::new("ip")
        .args(["netns", "list"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_direct_topology_lifecycle() {
    if !can_manage_namespaces() {
        eprintln!("skipping: requires root and iproute2");
        return;
    }

    let prefix = format!("tbt{}-", std::process::id() % 10_000);
    let mut config = Config::default();
    config.topology = TopologyKind::Direct;
    config.namespace_prefix = prefix.clone();

    let logger = Logger::new("TEST");
    let kernel = KernelVersion::detect().await.unwrap();
    let supervisor = ProcessSupervisor::new(Arc::new(NetnsSubstrate::new(prefix.clone(), false)), logger.named("PROC"));
    let shaper = TrafficShaper::new(supervisor.clone(), logger.named("SHAPE"), kernel);

    let mut topology = Topology::create(
        TopologyKind::Direct,
        prefix.clone(),
        supervisor.clone(),
        shaper,
        logger,
        &PathParams::from_config(&config),
    )
    .await
    .unwrap();

    assert!(topology.is_built());
    assert!(namespaces().contains(&format!("{}h1", prefix)));

    let reached = supervisor
        .run(&ExecTarget::host("h1"), "ping -c 1 -W 2 172.16.2.10", RunOptions::new().allow_failure())
        .await
        .unwrap();
    assert!(!reached.is_timed_out());

    topology.stop().await;
    topology.stop().await;
    assert!(!namespaces().contains(&prefix));
}
