//! WebSocket session loop: the realtime transport behind the event bus.
//!
//! Frames are JSON `{event, data}` envelopes in both directions. A session
//! owns its room subscriptions; room traffic is forwarded from the hub's
//! broadcast channels into the socket until the client leaves or drops.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use bcr_events::{player_room, EventSink, Frame, ErrorEvent, EV_ERROR};

use crate::intake;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut socket_tx, mut socket_rx) = socket.split();

    // All outbound frames funnel through one channel so room forwarders and
    // direct replies never interleave partial writes.
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if socket_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // room name → forwarder task
    let mut subscriptions: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = socket_rx.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let frame: Frame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                send_error(&out_tx, &format!("malformed frame: {e}"), None).await;
                continue;
            }
        };

        match frame.event.as_str() {
            bcr_events::EV_JOIN_ROOM => {
                if let Some(address) = room_address(&frame.data) {
                    let room = player_room(&address);
                    if !subscriptions.contains_key(&room) {
                        let rx = state.hub.join(&room);
                        let tx = out_tx.clone();
                        let handle = tokio::spawn(async move {
                            let mut stream = BroadcastStream::new(rx);
                            while let Some(Ok(frame)) = stream.next().await {
                                if tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        });
                        debug!(room, "client joined room");
                        subscriptions.insert(room, handle);
                    }
                }
            }
            bcr_events::EV_LEAVE_ROOM => {
                if let Some(address) = room_address(&frame.data) {
                    let room = player_room(&address);
                    if let Some(handle) = subscriptions.remove(&room) {
                        handle.abort();
                        debug!(room, "client left room");
                    }
                }
            }
            _ => {
                if let Err(e) = dispatch_intent(&state, &frame).await {
                    let transaction_id = frame.data["transaction_id"]
                        .as_str()
                        .map(str::to_string);
                    warn!(event = %frame.event, error = %format!("{e:#}"), "intent rejected");
                    send_error(&out_tx, &format!("{e:#}"), transaction_id).await;
                }
            }
        }
    }

    for (_, handle) in subscriptions {
        handle.abort();
    }
    writer.abort();
}

/// Route one client frame into the matching intake path.
async fn dispatch_intent(state: &AppState, frame: &Frame) -> anyhow::Result<()> {
    let sink: &dyn EventSink = state.hub.as_ref();

    match frame.event.as_str() {
        bcr_events::EV_CREATE_GAME => {
            let req = serde_json::from_value(frame.data.clone())?;
            intake::accept_create_game(&state.pool, sink, &req).await?;
        }
        bcr_events::EV_MAKE_MOVE => {
            let req = serde_json::from_value(frame.data.clone())?;
            intake::accept_make_move(&state.pool, sink, &req).await?;
        }
        bcr_events::EV_END_GAME => {
            let req = serde_json::from_value(frame.data.clone())?;
            intake::accept_end_game(&state.pool, sink, &req).await?;
        }
        bcr_events::EV_MINT_NFT => {
            let req = serde_json::from_value(frame.data.clone())?;
            intake::accept_mint_nft(&state.pool, sink, &req).await?;
        }
        bcr_events::EV_NFT_MINT => {
            let req = serde_json::from_value(frame.data.clone())?;
            intake::request_reward(&state.pool, sink, &req).await?;
        }
        other => {
            anyhow::bail!("unknown event '{other}'");
        }
    }
    Ok(())
}

/// `join-player-room` payloads are either a bare address string or
/// `{player_address}`.
fn room_address(data: &Value) -> Option<String> {
    data.as_str()
        .or_else(|| data["player_address"].as_str())
        .map(str::to_string)
}

async fn send_error(out: &mpsc::Sender<Frame>, message: &str, transaction_id: Option<String>) {
    let frame = Frame {
        event: EV_ERROR.to_string(),
        data: serde_json::to_value(ErrorEvent {
            error: message.to_string(),
            transaction_id,
        })
        .expect("event serialization"),
    };
    let _ = out.send(frame).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_address_accepts_both_shapes() {
        assert_eq!(room_address(&json!("0xa1")), Some("0xa1".to_string()));
        assert_eq!(
            room_address(&json!({"player_address": "0xa1"})),
            Some("0xa1".to_string())
        );
        assert_eq!(room_address(&json!({"other": 1})), None);
    }
}
