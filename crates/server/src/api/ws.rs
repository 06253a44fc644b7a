//! WebSocket feed of step and pipeline changes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use enrich_core::{PipelineRun, StepRuntimeState};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A step's runtime state changed.
    StepUpdate { step: StepRuntimeState },
    /// The pipeline run changed.
    PipelineUpdate { run: PipelineRun },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::StepUpdate { .. } => "step_update",
            WsMessage::PipelineUpdate { .. } => "pipeline_update",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no change falls in between.
    let mut steps_rx = state.orchestrator().subscribe_steps();
    let mut pipeline_rx = state.orchestrator().subscribe_pipeline();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let mut snapshot: Vec<WsMessage> = state
        .orchestrator()
        .step_states()
        .await
        .into_iter()
        .map(|step| WsMessage::StepUpdate { step })
        .collect();
    snapshot.push(WsMessage::PipelineUpdate {
        run: state.orchestrator().pipeline_run().await,
    });

    let send_task = tokio::spawn(async move {
        for msg in snapshot {
            if !send(&mut sender, msg).await {
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            let msg = tokio::select! {
                result = steps_rx.recv() => match result {
                    Ok(step) => WsMessage::StepUpdate { step },
                    Err(e) => {
                        if lagged_or_closed(e) { break; }
                        continue;
                    }
                },
                result = pipeline_rx.recv() => match result {
                    Ok(run) => WsMessage::PipelineUpdate { run },
                    Err(e) => {
                        if lagged_or_closed(e) { break; }
                        continue;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            };

            if !send(&mut sender, msg).await {
                break;
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                // The feed is one-way; log and ignore.
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

/// Returns false once the client is gone.
async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: WsMessage) -> bool {
    let json = match serde_json::to_string(&msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize WsMessage: {}", e);
            return true;
        }
    };
    if sender.send(Message::Text(json.into())).await.is_err() {
        debug!("WebSocket send failed, client disconnected");
        return false;
    }
    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
    true
}

/// Returns true if the feed is closed.
fn lagged_or_closed(e: broadcast::error::RecvError) -> bool {
    match e {
        broadcast::error::RecvError::Lagged(n) => {
            warn!("WebSocket client lagged, skipped {} messages", n);
            WS_LAG_EVENTS.inc();
            false
        }
        broadcast::error::RecvError::Closed => {
            debug!("Broadcast channel closed");
            true
        }
    }
}
