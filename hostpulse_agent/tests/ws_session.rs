//! Real WebSocket sessions against a served router.
mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{config, FixedProvider};
use futures_util::{SinkExt, StreamExt};
use hostpulse_agent::api::router;
use hostpulse_agent::lifecycle::Lifecycle;
use hostpulse_agent::registry::ConnectionRegistry;
use hostpulse_agent::state::AppState;
use hostpulse_agent::store::SampleStore;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(interval: Duration) -> (Lifecycle, AppState, SocketAddr) {
    let mut lc = Lifecycle::new(config(interval));
    let state = lc
        .start_with_store(
            SampleStore::open_in_memory().unwrap(),
            Arc::new(FixedProvider::default()),
            Arc::new(ConnectionRegistry::new()),
        )
        .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (lc, state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect ws");
    ws
}

/// Collect text frames for `window`.
async fn texts_for(ws: &mut Client, window: Duration) -> Vec<String> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Message::Text(t) = msg {
            out.push(t);
        }
    }
    out
}

async fn wait_for_count(state: &AppState, want: usize) {
    for _ in 0..100 {
        if state.registry.count().await == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("registry never reached {want} connections");
}

#[tokio::test]
async fn viewer_receives_initial_and_periodic_metrics() {
    let (mut lc, _state, addr) = serve(Duration::from_millis(200)).await;
    let mut ws = connect(addr).await;

    let frames = texts_for(&mut ws, Duration::from_millis(900)).await;
    let events: Vec<serde_json::Value> = frames
        .iter()
        .filter_map(|f| serde_json::from_str::<serde_json::Value>(f).ok())
        .collect();
    assert!(events.len() >= 3, "got {} events", events.len());
    for ev in &events {
        assert_eq!(ev["type"], "metrics");
        assert_eq!(ev["data"]["cpu_percent"], 37.5);
        assert_eq!(ev["data"]["uptime_formatted"], "1d 1m 1s");
        assert!(ev["timestamp"].as_str().unwrap().ends_with('Z'));
    }
    lc.stop().await.unwrap();
}

#[tokio::test]
async fn viewer_ping_is_answered_with_exactly_one_pong() {
    let (mut lc, _state, addr) = serve(Duration::from_millis(200)).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("ping".into())).await.unwrap();
    let frames = texts_for(&mut ws, Duration::from_millis(500)).await;
    assert_eq!(frames.iter().filter(|f| *f == "pong").count(), 1);
    lc.stop().await.unwrap();
}

#[tokio::test]
async fn silent_viewer_gets_one_server_ping() {
    // heartbeat interval is 1s in the test config
    let (mut lc, _state, addr) = serve(Duration::from_secs(60)).await;
    let mut ws = connect(addr).await;

    let frames = texts_for(&mut ws, Duration::from_millis(1_600)).await;
    assert_eq!(frames.iter().filter(|f| *f == "ping").count(), 1);
    assert_eq!(frames.iter().filter(|f| *f == "pong").count(), 0);
    lc.stop().await.unwrap();
}

#[tokio::test]
async fn unexpected_viewer_frames_are_ignored() {
    let (mut lc, state, addr) = serve(Duration::from_secs(60)).await;
    let mut ws = connect(addr).await;
    wait_for_count(&state, 1).await;

    ws.send(Message::Text("get_metrics".into())).await.unwrap();
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let frames = texts_for(&mut ws, Duration::from_millis(300)).await;
    assert!(frames.iter().all(|f| f != "pong"));
    assert_eq!(state.registry.count().await, 1, "connection stays open");
    lc.stop().await.unwrap();
}

#[tokio::test]
async fn closing_viewer_is_unregistered() {
    let (mut lc, state, addr) = serve(Duration::from_secs(60)).await;
    let a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for_count(&state, 2).await;

    b.close(None).await.unwrap();
    wait_for_count(&state, 1).await;
    drop(a);
    wait_for_count(&state, 0).await;
    lc.stop().await.unwrap();
}
