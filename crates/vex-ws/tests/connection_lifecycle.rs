//! Connection lifecycle tests against a local mock server.

mod common;

use common::mock_ws::{MockOptions, MockWsServer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vex_core::AssetSymbol;
use vex_ws::{ConnectionConfig, ConnectionManager, ConnectionState, DataFrame, FrameHandler};

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<DataFrame>>,
}

impl FrameHandler for Recorder {
    fn on_frame(&self, frame: DataFrame) {
        self.frames.lock().push(frame);
    }
}

fn config(url: String) -> ConnectionConfig {
    ConnectionConfig {
        url,
        heartbeat_interval_ms: 60_000,
        reconnect_delay_ms: 100,
        batch_pace_ms: 10,
        ..Default::default()
    }
}

fn symbols(names: &[&str]) -> Vec<AssetSymbol> {
    names.iter().map(|n| AssetSymbol::from(*n)).collect()
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, target: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

macro_rules! eventually {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..100 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(reached, "condition not reached within 5s");
    }};
}

#[tokio::test]
async fn test_queued_subscriptions_replayed_on_open() {
    let server = MockWsServer::start().await;
    let mgr = ConnectionManager::new(config(server.url()), Arc::new(Recorder::default()));
    let mut state = mgr.state_watch();

    mgr.subscribe(&symbols(&["BTC-USDT-SWAP", "ETH-USDT-SWAP"])).await;
    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    eventually!(!server.requests().await.is_empty());
    let requests = server.requests().await;
    assert_eq!(requests[0].1, "subscribe");
    assert_eq!(requests[0].2, vec!["BTC-USDT-SWAP", "ETH-USDT-SWAP"]);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_is_idempotent_and_batched() {
    let server = MockWsServer::start().await;
    let mgr = ConnectionManager::new(config(server.url()), Arc::new(Recorder::default()));
    let mut state = mgr.state_watch();

    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let many: Vec<AssetSymbol> = (0..85)
        .map(|i| AssetSymbol::new(format!("A{i:03}-USDT-SWAP")))
        .collect();
    assert_eq!(mgr.subscribe(&many).await, 85);
    assert_eq!(mgr.subscribe(&many[..10]).await, 0);

    eventually!(server.requests().await.len() >= 3);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let requests = server.requests().await;
    let sizes: Vec<usize> = requests.iter().map(|r| r.2.len()).collect();
    assert_eq!(sizes, vec![40, 40, 5]);

    let total: usize = sizes.iter().sum();
    assert_eq!(total, 85);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_batches_of_fifty() {
    let server = MockWsServer::start().await;
    let mgr = ConnectionManager::new(config(server.url()), Arc::new(Recorder::default()));
    let mut state = mgr.state_watch();

    let many: Vec<AssetSymbol> = (0..60)
        .map(|i| AssetSymbol::new(format!("U{i:03}-USDT-SWAP")))
        .collect();
    mgr.subscribe(&many).await;
    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    eventually!(server.requests().await.len() >= 2);

    assert_eq!(mgr.unsubscribe(&many).await, 60);
    assert!(mgr.registry().is_empty());

    eventually!(
        server
            .requests()
            .await
            .iter()
            .filter(|r| r.1 == "unsubscribe")
            .count()
            >= 2
    );
    let unsub: Vec<usize> = server
        .requests()
        .await
        .iter()
        .filter(|r| r.1 == "unsubscribe")
        .map(|r| r.2.len())
        .collect();
    assert_eq!(unsub, vec![50, 10]);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close_and_replays() {
    let server = MockWsServer::start_with(MockOptions {
        drop_first_after: Some(Duration::from_millis(300)),
        ..Default::default()
    })
    .await;
    let mgr = ConnectionManager::new(config(server.url()), Arc::new(Recorder::default()));

    mgr.subscribe(&symbols(&["SOL-USDT-SWAP"])).await;
    mgr.connect();

    eventually!(server.connection_count().await >= 2);
    eventually!(
        server
            .requests()
            .await
            .iter()
            .any(|(conn, op, ids)| *conn == 2 && op == "subscribe" && ids == &["SOL-USDT-SWAP"])
    );
    eventually!(mgr.state() == ConnectionState::Connected);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_watchdog_forces_reconnect_when_silent() {
    let server = MockWsServer::start_with(MockOptions {
        reply_pong: false,
        ..Default::default()
    })
    .await;
    let mut cfg = config(server.url());
    cfg.heartbeat_interval_ms = 100;
    let mgr = ConnectionManager::new(cfg, Arc::new(Recorder::default()));

    mgr.connect();
    eventually!(server.connection_count().await >= 2);

    let pings = server
        .received()
        .await
        .iter()
        .filter(|(_, text)| text == "ping")
        .count();
    assert!(pings >= 1);

    mgr.disconnect();
    server.shutdown().await;
}

#[tokio::test]
async fn test_pong_keeps_session_alive() {
    let server = MockWsServer::start().await;
    let mut cfg = config(server.url());
    cfg.heartbeat_interval_ms = 100;
    let mgr = ConnectionManager::new(cfg, Arc::new(Recorder::default()));
    let mut state = mgr.state_watch();

    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(server.connection_count().await, 1);
    assert_eq!(mgr.state(), ConnectionState::Connected);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_data_frames_reach_handler() {
    let server = MockWsServer::start().await;
    let recorder = Arc::new(Recorder::default());
    let mgr = ConnectionManager::new(config(server.url()), recorder.clone());
    let mut state = mgr.state_watch();

    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    server.push(r#"{"event":"subscribe","arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"}}"#);
    server.push(
        r#"{"arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"},"data":[["1700000000000","1","2","0.5","1.5","10","0","0","0"]]}"#,
    );

    eventually!(!recorder.frames.lock().is_empty());
    let frames = recorder.frames.lock();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].arg.inst_id, "BTC-USDT-SWAP");
    drop(frames);

    mgr.shutdown();
    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_keeps_registry_and_stops_reconnects() {
    let server = MockWsServer::start().await;
    let mgr = ConnectionManager::new(config(server.url()), Arc::new(Recorder::default()));
    let mut state = mgr.state_watch();

    mgr.subscribe(&symbols(&["BTC-USDT-SWAP"])).await;
    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    mgr.disconnect();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(mgr.state(), ConnectionState::UserTerminated);
    assert_eq!(server.connection_count().await, 1);
    assert!(mgr.registry().contains("BTC-USDT-SWAP"));

    // A manual connect resumes with the same registry
    mgr.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    eventually!(
        server
            .requests()
            .await
            .iter()
            .any(|(conn, _, ids)| *conn == 2 && ids == &["BTC-USDT-SWAP"])
    );

    mgr.shutdown();
    server.shutdown().await;
}
