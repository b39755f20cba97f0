//! In-process link tests: real sockets, one tokio runtime.

use std::time::Duration;

use meshnode::NodeError;
use meshnode_net::NodeEvent;

use crate::harness::{TestNodeBuilder, TestTree};

/// Full tree wires up: A has 3 outbound, B/C/D one each way, E 3 inbound.
#[tokio::test]
async fn test_tree_wires_up_in_process() {
    let tree = TestTree::new().await.unwrap();
    tree.wait_wired(Duration::from_secs(10)).await.unwrap();

    let a = tree.a.counts().await;
    assert_eq!((a.inbound, a.outbound), (0, 3));
    let e = tree.e.counts().await;
    assert_eq!((e.inbound, e.outbound), (3, 0));

    tree.shutdown_all().await;
}

/// Outbound events name the configured peer target.
#[tokio::test]
async fn test_peer_connected_events() {
    let sink = TestNodeBuilder::new("E").build().await.unwrap();
    let mut src = TestNodeBuilder::new("B").peer(sink.port()).build().await.unwrap();
    src.wait_links(0, 1, Duration::from_secs(10)).await.unwrap();

    let mut saw_listening = false;
    let mut saw_connected = false;
    while let Ok(ev) = src.events.try_recv() {
        match ev {
            NodeEvent::Listening { port, .. } => {
                assert!(!saw_connected, "listening must precede peer_connected");
                assert_eq!(port, src.port());
                saw_listening = true;
            }
            NodeEvent::PeerConnected { peer, .. } => {
                assert_eq!(peer, sink.port().to_string());
                saw_connected = true;
            }
            _ => {}
        }
    }
    assert!(saw_listening && saw_connected);

    src.shutdown().await;
    sink.shutdown().await;
}

/// Stopping a downstream node drops the upstream node's outbound link.
#[tokio::test]
async fn test_remote_close_removes_link() {
    let sink = TestNodeBuilder::new("E").build().await.unwrap();
    let mut src = TestNodeBuilder::new("D").peer(sink.port()).build().await.unwrap();
    src.wait_links(0, 1, Duration::from_secs(10)).await.unwrap();
    sink.wait_links(1, 0, Duration::from_secs(10)).await.unwrap();

    sink.shutdown().await;

    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match src.events.recv().await {
                Ok(NodeEvent::PeerClosed { label, .. }) => break label,
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("peer_closed never emitted");
    assert_eq!(closed, "D");

    // the link is deregistered before peer_closed is emitted
    assert_eq!(src.counts().await.outbound, 0);
    src.shutdown().await;
}

/// A node whose peer never comes up reports a fatal dial error.
#[tokio::test]
async fn test_missing_peer_is_fatal() {
    let dead_port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let mut node = TestNodeBuilder::new("A")
        .peer(dead_port)
        .dial_attempts(2)
        .build()
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), node.node.wait())
        .await
        .expect("wait should return the dial error");
    assert!(matches!(result, Err(NodeError::Dial { .. })));
    node.shutdown().await;
}

/// Binding a port that is already taken is a startup failure.
#[tokio::test]
async fn test_port_in_use_is_bind_error() {
    let first = TestNodeBuilder::new("E").build().await.unwrap();
    let mut cfg = meshnode::config::NodeConfig::default();
    cfg.node.label = Some("E2".into());
    cfg.node.listen_port = first.port();

    let err = meshnode::start(cfg, meshnode::events::EventSink::Discard)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, NodeError::Bind { .. }));
    first.shutdown().await;
}
