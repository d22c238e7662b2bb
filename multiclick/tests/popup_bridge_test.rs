//! Exercises the popup WebSocket bridge end to end: envelope requests in,
//! structured responses and automation pushes out.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use multiclick::bridge::PopupBridge;
use multiclick::host::simulated::SimulatedPage;
use multiclick::{AutomationError, DriverTiming, Page, Settings};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn fast_page(host: &SimulatedPage) -> Arc<Page> {
    let timing = DriverTiming {
        settle: Duration::from_millis(2),
        grace: Duration::from_millis(10),
        min_interval: 0.0,
        default_interval: 0.02,
        jitter_window: 0.0,
    };
    Arc::new(Page::with_settings(
        Arc::new(host.clone()),
        Settings::default(),
        timing,
    ))
}

async fn connect(bridge: &PopupBridge) -> WsClient {
    let addr = bridge.local_addr().expect("bridge bound");
    let (ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("connect to bridge");
    ws
}

async fn send_json(ws: &mut WsClient, payload: serde_json::Value) {
    ws.send(Message::Text(payload.to_string()))
        .await
        .expect("send request");
}

async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(txt) = msg {
            return serde_json::from_str(&txt).expect("valid json");
        }
    }
}

#[tokio::test]
async fn scan_request_returns_grouped_patterns() -> anyhow::Result<()> {
    init_tracing();
    let host = SimulatedPage::new();
    for _ in 0..3 {
        host.push_button("Claim");
    }
    host.push_button("Follow");
    host.push_hidden("Claim");

    let bridge = PopupBridge::bind(fast_page(&host), "127.0.0.1:0").await?;
    let mut ws = connect(&bridge).await;

    send_json(&mut ws, serde_json::json!({"action": "scanButtons"})).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["success"], true);
    let patterns = reply["patterns"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("patterns missing from reply: {reply}"))?;
    assert_eq!(patterns[0]["text"], "Claim");
    assert_eq!(patterns[0]["count"], 3);
    assert_eq!(patterns[1]["text"], "Follow");
    assert_eq!(patterns[1]["count"], 1);
    Ok(())
}

#[tokio::test]
async fn start_request_streams_progress_and_completion_pushes() {
    init_tracing();
    let host = SimulatedPage::new();
    for _ in 0..3 {
        host.push_button("Claim");
    }

    let bridge = PopupBridge::bind(fast_page(&host), "127.0.0.1:0")
        .await
        .expect("bind");
    let mut ws = connect(&bridge).await;

    send_json(
        &mut ws,
        serde_json::json!({
            "action": "startAutomation",
            "pattern": "Claim",
            "intervalSeconds": 0.02,
        }),
    )
    .await;

    // Responses and pushes share the socket; classify as they arrive.
    let mut start_reply = None;
    let mut progress_pushes = Vec::new();
    let completion = loop {
        let msg = recv_json(&mut ws).await;
        match msg["action"].as_str() {
            Some("progressUpdate") => progress_pushes.push(msg),
            Some("automationComplete") => break msg,
            _ => start_reply = Some(msg),
        }
    };

    let start_reply = start_reply.expect("start response");
    assert_eq!(start_reply["success"], true);
    assert_eq!(start_reply["totalButtons"], 3);
    assert_eq!(start_reply["pattern"], "Claim");

    assert_eq!(progress_pushes.len(), 3);
    assert_eq!(progress_pushes[0]["clickedCount"], 1);
    assert_eq!(progress_pushes[2]["clickedCount"], 3);

    assert_eq!(completion["completed"], true);
    assert_eq!(completion["totalClicked"], 3);
    assert!(completion["ts"].as_u64().is_some());

    assert_eq!(host.total_clicks(), 3);
}

#[tokio::test]
async fn stop_on_idle_succeeds_and_invalid_requests_get_an_error_reply() {
    init_tracing();
    let host = SimulatedPage::new();
    host.push_button("Claim");

    let bridge = PopupBridge::bind(fast_page(&host), "127.0.0.1:0")
        .await
        .expect("bind");
    let mut ws = connect(&bridge).await;

    send_json(&mut ws, serde_json::json!({"action": "stopAutomation"})).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["success"], true);

    send_json(&mut ws, serde_json::json!({"action": "selfDestruct"})).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["success"], false);
    assert!(reply["error"].as_str().expect("error string").contains("invalid request"));
}

#[tokio::test]
async fn unbindable_address_surfaces_host_unavailable() {
    init_tracing();
    let host = SimulatedPage::new();
    let err = PopupBridge::bind(fast_page(&host), "not-an-address")
        .await
        .err()
        .expect("bind must fail");
    assert!(matches!(err, AutomationError::HostUnavailable(_)));
    assert!(err.to_string().contains("not-an-address"));
}

#[tokio::test]
async fn highlight_request_reports_the_match_count() {
    init_tracing();
    let host = SimulatedPage::new();
    for _ in 0..2 {
        host.push_button("Claim");
    }

    let bridge = PopupBridge::bind(fast_page(&host), "127.0.0.1:0")
        .await
        .expect("bind");
    assert!(!bridge.is_client_connected().await);
    let mut ws = connect(&bridge).await;

    send_json(
        &mut ws,
        serde_json::json!({"action": "highlightButtons", "pattern": "Claim"}),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["highlightedCount"], 2);
    assert_eq!(host.highlighted_count(), 2);
    assert!(bridge.is_client_connected().await);
}
