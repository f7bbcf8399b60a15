//! WebSocket Support for Real-time Round Events
//!
//! Every engine event is fanned out to connected clients as
//! `{"event": name, "payload": ...}`. A new client first receives the current
//! phase, both histories and the live table so it can render immediately.

use super::handlers::AppState;
use crate::games::engine::RoundEngine;
use crate::games::events::{EventSink, RoundEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// WebSocket connection manager
#[derive(Clone)]
pub struct WebSocketManager {
    /// Broadcast sender for events
    tx: broadcast::Sender<RoundEvent>,

    /// Connected clients counter
    client_count: Arc<AtomicU64>,
}

impl WebSocketManager {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);

        Self {
            tx,
            client_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.tx.subscribe()
    }

    /// Handle WebSocket upgrade
    pub fn handle_upgrade(&self, ws: WebSocketUpgrade, engine: Arc<RoundEngine>) -> Response {
        let manager = self.clone();

        ws.on_upgrade(move |socket| async move { manager.handle_connection(socket, engine).await })
    }

    /// Handle individual WebSocket connection
    async fn handle_connection(&self, socket: WebSocket, engine: Arc<RoundEngine>) {
        let client_id = generate_client_id();
        let client_count = self.client_count.fetch_add(1, Ordering::SeqCst) + 1;

        info!("🔌 WebSocket client {} connected (total: {})", client_id, client_count);

        let (mut sender, mut receiver) = socket.split();
        // subscribe before the snapshot so nothing between the two is lost
        let mut rx = self.tx.subscribe();

        for event in engine.snapshot_events().await {
            let Some(message) = encode(&event) else {
                continue;
            };
            if let Err(e) = sender.send(message).await {
                warn!("Failed to send snapshot to client {}: {}", client_id, e);
                self.release(&client_id);
                return;
            }
        }

        let client_id_for_recv = client_id.clone();
        let client_id_for_send = client_id.clone();

        // Task to handle incoming messages from client
        let receive_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        debug!("Ignoring message from client {}: {}", client_id_for_recv, text);
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client {} requested close", client_id_for_recv);
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error from client {}: {}", client_id_for_recv, e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        // Task to send events to client
        let send_task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} events", client_id_for_send, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(message) = encode(&event) else {
                    continue;
                };
                if sender.send(message).await.is_err() {
                    debug!("Client {} disconnected", client_id_for_send);
                    break;
                }
            }
        });

        tokio::select! {
            _ = receive_task => {
                debug!("Receive task completed for client {}", client_id);
            }
            _ = send_task => {
                debug!("Send task completed for client {}", client_id);
            }
        }

        self.release(&client_id);
    }

    fn release(&self, client_id: &str) {
        let remaining = self.client_count.fetch_sub(1, Ordering::SeqCst) - 1;
        info!("🔌 WebSocket client {} disconnected (remaining: {})", client_id, remaining);
    }

    pub fn client_count(&self) -> u64 {
        self.client_count.load(Ordering::SeqCst)
    }
}

impl EventSink for WebSocketManager {
    fn publish(&self, event: RoundEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("No WebSocket clients to receive {} event", e.0.name());
        }
    }
}

fn encode(event: &RoundEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.name(), e);
            None
        }
    }
}

fn generate_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// WebSocket handler
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    state
        .websocket_manager
        .handle_upgrade(ws, state.engine.clone())
}
