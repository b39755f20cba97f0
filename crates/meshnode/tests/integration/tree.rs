//! Process-level topology tests: real `meshnode` children started by meshnode-harness.

use std::time::Duration;

use meshnode_harness::{Harness, HarnessError, Topology};

use crate::harness::{launch_options, node_bin};

/// True if `pid` still names a live (non-zombie) process.
#[cfg(target_os = "linux")]
fn pid_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // third field is the state; Z = zombie, X = dead
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

/// Start the five-node tree and check every startup-ordering property.
#[tokio::test]
async fn test_tree_startup_contract() {
    let mut harness = Harness::start(node_bin(), &Topology::tree(), launch_options())
        .await
        .unwrap();

    // sink first, fan-out next, source last
    assert_eq!(harness.start_order(), vec!["E", "B", "C", "D", "A"]);

    // every node alive with a real port
    assert!(harness.all_alive());
    for node in harness.nodes() {
        assert_ne!(node.port(), 0, "node {} reported port 0", node.label());
    }

    // B, C, D were each given E's port
    let e_port = harness.port("E").unwrap();
    for label in ["B", "C", "D"] {
        assert_eq!(harness.node(label).unwrap().peer_ports(), &[e_port]);
    }

    // A was given exactly B, C, D's ports
    let a = harness.node("A").unwrap();
    let expected = vec![
        harness.port("B").unwrap(),
        harness.port("C").unwrap(),
        harness.port("D").unwrap(),
    ];
    assert_eq!(a.peer_ports(), expected.as_slice());
    assert_eq!(a.args().iter().filter(|arg| *arg == "-p").count(), 3);
    assert_eq!(a.args().last().map(String::as_str), Some("A"));

    // links actually come up
    let timeout = Duration::from_secs(20);
    harness.node("A").unwrap().wait_connected(3, timeout).await.unwrap();
    for label in ["B", "C", "D"] {
        let node = harness.node(label).unwrap();
        node.wait_connected(1, timeout).await.unwrap();
        node.wait_accepted(1, timeout).await.unwrap();
    }
    harness.node("E").unwrap().wait_accepted(3, timeout).await.unwrap();

    harness.shutdown().await.unwrap();
}

/// After shutdown no node process remains.
#[tokio::test]
async fn test_shutdown_terminates_every_node() {
    let mut harness = Harness::start(node_bin(), &Topology::tree(), launch_options())
        .await
        .unwrap();
    let pids: Vec<u32> = harness.nodes().filter_map(|n| n.pid()).collect();
    assert_eq!(pids.len(), 5);

    harness.shutdown().await.unwrap();
    assert!(harness.is_cleaned_up());
    assert!(!harness.all_alive());
    for label in ["A", "B", "C", "D", "E"] {
        assert!(harness.node_mut(label).unwrap().is_terminated());
    }
    #[cfg(target_os = "linux")]
    for pid in pids {
        assert!(!pid_running(pid), "pid {pid} still running after shutdown");
    }

    // cleanup runs once; a second call is a no-op
    harness.shutdown().await.unwrap();
}

/// Dropping the harness without shutdown still kills the children.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_drop_kills_nodes() {
    let harness = Harness::start(node_bin(), &Topology::tree(), launch_options())
        .await
        .unwrap();
    let pids: Vec<u32> = harness.nodes().filter_map(|n| n.pid()).collect();
    drop(harness);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while pids.iter().any(|&pid| pid_running(pid)) {
        assert!(tokio::time::Instant::now() < deadline, "children survived harness drop");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A port nothing is listening on right now.
fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

/// Fixed listen ports are passed through with -l.
#[tokio::test]
async fn test_fixed_listen_port() {
    let fixed = free_port();
    let topo = Topology::new()
        .node("B", Some(fixed), &["E"])
        .node("E", None, &[]);

    let mut harness = Harness::start(node_bin(), &topo, launch_options()).await.unwrap();
    assert_eq!(harness.port("B").unwrap(), fixed);
    assert_eq!(
        harness.node("B").unwrap().args()[..2],
        ["-l".to_string(), fixed.to_string()]
    );
    harness.shutdown().await.unwrap();
}

/// A node that cannot bind fails the launch and the earlier nodes are cleaned up.
#[tokio::test]
async fn test_bind_failure_aborts_start() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    // E gets a fixed port so we can tell afterwards whether it is still held.
    let e_port = free_port();
    let topo = Topology::new()
        .node("B", Some(port), &["E"])
        .node("E", Some(e_port), &[]);

    let err = Harness::start(node_bin(), &topo, launch_options())
        .await
        .err()
        .unwrap();
    match err {
        HarnessError::EarlyExit { label, .. } => assert_eq!(label, "B"),
        other => panic!("unexpected error: {other}"),
    }

    // E was started, then torn down and reaped before start returned.
    std::net::TcpListener::bind(("127.0.0.1", e_port))
        .expect("E still holds its port after the failed start");
}
