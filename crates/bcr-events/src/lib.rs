//! Event vocabulary and the room-scoped event bus seam.
//!
//! Every event name, room-naming rule, and server→client payload shape lives
//! here so handlers and workers cannot drift apart. The transport itself is
//! behind [`EventSink`]: the server wires a [`RoomHub`] (tokio broadcast per
//! room, surfaced over WebSocket); tests wire a [`CaptureSink`].

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

// Client → server
pub const EV_CREATE_GAME: &str = "transaction:create_game";
pub const EV_MAKE_MOVE: &str = "transaction:make_move";
pub const EV_END_GAME: &str = "transaction:end_game";
pub const EV_MINT_NFT: &str = "transaction:mint_nft";
pub const EV_NFT_MINT: &str = "nftMint";
pub const EV_JOIN_ROOM: &str = "join-player-room";
pub const EV_LEAVE_ROOM: &str = "leave-player-room";

// Server → client
pub const EV_QUEUED: &str = "transaction:queued";
pub const EV_PROCESSING: &str = "transaction:processing";
pub const EV_RESULT: &str = "transaction:result";
pub const EV_MINT_TASK_QUEUED: &str = "mint-task-queued";
pub const EV_ERROR: &str = "error";

/// Room name for a player's private status stream.
pub fn player_room(actor: &str) -> String {
    format!("player:{actor}")
}

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub id: String,
    /// "queued" | "waiting_for_object_id"
    pub status: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub id: String,
    pub status: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEvent {
    pub id: String,
    /// "success" | "error"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ts: i64,
}

impl ResultEvent {
    pub fn success(id: &str, digest: &str) -> Self {
        Self {
            id: id.to_string(),
            status: "success".to_string(),
            digest: Some(digest.to_string()),
            object_id: None,
            reward_name: None,
            badge_type: None,
            error: None,
            ts: now_ts(),
        }
    }

    pub fn error(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            status: "error".to_string(),
            digest: None,
            object_id: None,
            reward_name: None,
            badge_type: None,
            error: Some(message.to_string()),
            ts: now_ts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintTaskQueuedEvent {
    pub task_id: String,
    pub reward_type: String,
    pub player_id: Uuid,
    pub player_sui_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Outbound event seam. `emit` never fails: a room with no subscribers is a
/// normal condition (the client reconnects and tolerates duplicates).
pub trait EventSink: Send + Sync {
    fn emit(&self, room: &str, event: &str, payload: Value);
}

/// A single wire frame as sent over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: Value,
}

// ---------------------------------------------------------------------------
// RoomHub: broadcast-channel-per-room sink
// ---------------------------------------------------------------------------

/// Broadcast hub keyed by room name. Each room is a `broadcast::Sender`;
/// WebSocket sessions subscribe on join and drop their receiver on leave.
/// Senders for empty rooms are pruned lazily on emit.
pub struct RoomHub {
    rooms: Mutex<HashMap<String, broadcast::Sender<Frame>>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a room, creating it on first join.
    pub fn join(&self, room: &str) -> broadcast::Receiver<Frame> {
        let mut rooms = self.rooms.lock().expect("room map poisoned");
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().expect("room map poisoned").len()
    }
}

impl EventSink for RoomHub {
    fn emit(&self, room: &str, event: &str, payload: Value) {
        let frame = Frame {
            event: event.to_string(),
            data: payload,
        };
        let mut rooms = self.rooms.lock().expect("room map poisoned");
        let dead = match rooms.get(room) {
            Some(tx) => tx.send(frame).is_err(),
            None => {
                tracing::debug!(room, event, "emit to room with no subscribers");
                false
            }
        };
        if dead {
            // Last receiver is gone; drop the room.
            rooms.remove(room);
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureSink: test double
// ---------------------------------------------------------------------------

/// Records every emitted frame; scenario tests assert on the sequence.
#[derive(Default)]
pub struct CaptureSink {
    emitted: Mutex<Vec<(String, String, Value)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<(String, String, Value)> {
        self.emitted.lock().expect("capture poisoned").clone()
    }

    /// Event names emitted to `room`, in order.
    pub fn events_for(&self, room: &str) -> Vec<String> {
        self.emitted
            .lock()
            .expect("capture poisoned")
            .iter()
            .filter(|(r, _, _)| r == room)
            .map(|(_, e, _)| e.clone())
            .collect()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, room: &str, event: &str, payload: Value) {
        self.emitted
            .lock()
            .expect("capture poisoned")
            .push((room.to_string(), event.to_string(), payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_naming() {
        assert_eq!(player_room("0xA"), "player:0xA");
    }

    #[test]
    fn hub_delivers_to_joined_room() {
        let hub = RoomHub::default();
        let mut rx = hub.join("player:0xA");

        hub.emit("player:0xA", EV_PROCESSING, json!({"id": "t1"}));

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, EV_PROCESSING);
        assert_eq!(frame.data["id"], "t1");
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let hub = RoomHub::default();
        hub.emit("player:0xB", EV_RESULT, json!({}));
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn dead_room_is_pruned_on_emit() {
        let hub = RoomHub::default();
        let rx = hub.join("player:0xC");
        assert_eq!(hub.room_count(), 1);
        drop(rx);

        hub.emit("player:0xC", EV_RESULT, json!({}));
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn result_event_omits_absent_fields() {
        let ev = ResultEvent::success("t1", "d1");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["digest"], "d1");
        assert!(v.get("error").is_none());
        assert!(v.get("object_id").is_none());
    }

    #[test]
    fn capture_sink_preserves_order() {
        let sink = CaptureSink::new();
        sink.emit("player:0xA", EV_PROCESSING, json!({}));
        sink.emit("player:0xA", EV_RESULT, json!({}));
        assert_eq!(sink.events_for("player:0xA"), vec![EV_PROCESSING, EV_RESULT]);
    }
}
