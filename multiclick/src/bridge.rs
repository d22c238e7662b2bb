//! WebSocket bridge between the engine and popup clients.
//!
//! Popups connect as WebSocket clients, send `{action, ...}` envelopes, and
//! receive one structured response per request. Progress and completion are
//! pushed to every connected popup as they happen — a real event channel
//! rather than the shared-slot polling the popup would otherwise need — and
//! each push carries a timestamp so consumers can discard stale updates.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::api::{self, PopupRequest};
use crate::errors::AutomationError;
use crate::Page;

const DEFAULT_WS_ADDR: &str = "127.0.0.1:17474";

type Clients = Arc<Mutex<Vec<Client>>>;

struct Client {
    sender: mpsc::UnboundedSender<Message>,
}

pub struct PopupBridge {
    _server_task: JoinHandle<()>,
    _forward_task: JoinHandle<()>,
    clients: Clients,
    local_addr: Option<SocketAddr>,
}

static GLOBAL: OnceCell<Arc<PopupBridge>> = OnceCell::new();

impl PopupBridge {
    /// The process-wide bridge on the default port, started on first use.
    /// If the port cannot be bound, the engine keeps working with a bridge
    /// that accepts no connections; the error is logged for the operator.
    pub async fn global(page: Arc<Page>) -> Arc<PopupBridge> {
        if let Some(bridge) = GLOBAL.get() {
            return bridge.clone();
        }
        let bridge = match PopupBridge::bind(page, DEFAULT_WS_ADDR).await {
            Ok(bridge) => Arc::new(bridge),
            Err(e) => {
                warn!(error = %e, "popup bridge disabled");
                Arc::new(PopupBridge::disabled())
            }
        };
        let _ = GLOBAL.set(bridge.clone());
        // Another caller may have won the race; return the stored one.
        GLOBAL.get().cloned().unwrap_or(bridge)
    }

    /// Bind a bridge on `addr` (use port 0 in tests). A port that stays
    /// unavailable even after a retry surfaces as `HostUnavailable`.
    pub async fn bind(page: Arc<Page>, addr: &str) -> Result<PopupBridge, AutomationError> {
        let unavailable = |e: std::io::Error| {
            AutomationError::HostUnavailable(format!("popup bridge cannot listen on {addr}: {e}"))
        };
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                warn!(%addr, error = %e, "port in use, retrying once in 2s");
                tokio::time::sleep(Duration::from_secs(2)).await;
                TcpListener::bind(addr).await.map_err(unavailable)?
            }
            Err(e) => return Err(unavailable(e)),
        };
        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let local_addr = listener.local_addr().ok();
        if let Some(local) = local_addr {
            info!("popup bridge listening on {local}");
        }

        let accept_clients = clients.clone();
        let accept_page = page.clone();
        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "ws accept error");
                        continue;
                    }
                };
                let ws_clients = accept_clients.clone();
                let ws_page = accept_page.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!(error = %e, "ws handshake error");
                            return;
                        }
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    // writer task
                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                warn!(error = %e, "ws send error");
                                break;
                            }
                        }
                    });

                    // register client
                    {
                        ws_clients.lock().await.push(Client { sender: tx.clone() });
                    }
                    info!("popup connected");

                    // reader loop: one structured response per request
                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        let reply = match serde_json::from_str::<PopupRequest>(&txt) {
                            Ok(request) => {
                                debug!(?request, "popup request");
                                api::dispatch(&ws_page, request).await.to_string()
                            }
                            Err(e) => {
                                warn!(error = %e, "invalid popup request");
                                serde_json::json!({
                                    "success": false,
                                    "error": format!("invalid request: {e}"),
                                })
                                .to_string()
                            }
                        };
                        if tx.send(Message::Text(reply)).is_err() {
                            break;
                        }
                    }

                    writer.abort();
                });
            }
        });

        // push automation events to every connected popup
        let forward_clients = clients.clone();
        let mut events = page.subscribe();
        let forward_task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event forwarder lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "event serialize failed");
                        continue;
                    }
                };
                let mut clients = forward_clients.lock().await;
                clients.retain(|c| c.sender.send(Message::Text(payload.clone())).is_ok());
            }
        });

        Ok(PopupBridge {
            _server_task: server_task,
            _forward_task: forward_task,
            clients,
            local_addr,
        })
    }

    /// A bridge that accepts no connections.
    fn disabled() -> PopupBridge {
        PopupBridge {
            _server_task: tokio::spawn(async {}),
            _forward_task: tokio::spawn(async {}),
            clients: Arc::new(Mutex::new(Vec::new())),
            local_addr: None,
        }
    }

    /// Address the bridge actually bound, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn is_client_connected(&self) -> bool {
        !self.clients.lock().await.is_empty()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}
