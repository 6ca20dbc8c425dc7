//! Shared wire and queue types for blockchess-relay.
//!
//! Everything that crosses a boundary lives here: the intent kind/status
//! vocabulary stored in `transaction_queue`, the kind-specific payload
//! variants (persisted as jsonb), and the client→server request envelopes
//! accepted by intake. Validation of payload shapes is `validate()` on each
//! type; intake rejects before anything is persisted.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IntentKind
// ---------------------------------------------------------------------------

/// The four transaction kinds the relay submits on behalf of players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    CreateGame,
    MakeMove,
    EndGame,
    MintBadge,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::CreateGame => "create_game",
            IntentKind::MakeMove => "make_move",
            IntentKind::EndGame => "end_game",
            IntentKind::MintBadge => "mint_badge",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "create_game" => Ok(IntentKind::CreateGame),
            "make_move" => Ok(IntentKind::MakeMove),
            "end_game" => Ok(IntentKind::EndGame),
            "mint_badge" => Ok(IntentKind::MintBadge),
            other => Err(anyhow!("invalid intent kind: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// IntentStatus
// ---------------------------------------------------------------------------

/// Queue row lifecycle status.
///
/// Transitions: pending → processing → {completed, pending (retry), failed};
/// waiting_for_object_id → pending once the parent game's on-chain id is
/// known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    WaitingForObjectId,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Processing => "processing",
            IntentStatus::Completed => "completed",
            IntentStatus::Failed => "failed",
            IntentStatus::WaitingForObjectId => "waiting_for_object_id",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "processing" => Ok(IntentStatus::Processing),
            "completed" => Ok(IntentStatus::Completed),
            "failed" => Ok(IntentStatus::Failed),
            "waiting_for_object_id" => Ok(IntentStatus::WaitingForObjectId),
            other => Err(anyhow!("invalid intent status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload variants (persisted as jsonb, tagged by kind)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGamePayload {
    /// 0 = human-vs-human, 1 = human-vs-computer.
    pub mode: u8,
    /// 0 = easy, 1 = medium, 2 = hard.
    pub difficulty: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeMovePayload {
    /// Empty string until the parent CreateGame's object id is extracted.
    #[serde(default)]
    pub game_object_id: String,
    pub is_computer: bool,
    pub san: String,
    pub fen: String,
    pub move_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndGamePayload {
    pub game_object_id: String,
    /// Winner address; None encodes a draw (empty address vector on-chain).
    pub winner: Option<String>,
    /// "1-0" | "0-1" | "1/2-1/2"
    pub result: String,
    pub final_fen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBadgePayload {
    pub recipient_address: String,
    pub badge_type: String,
    pub name: String,
    pub description: String,
    pub source_url: String,
    /// Overrides the configured registry object when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_object_id: Option<String>,
}

/// Kind-tagged payload as stored in `transaction_queue.payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentPayload {
    CreateGame(CreateGamePayload),
    MakeMove(MakeMovePayload),
    EndGame(EndGamePayload),
    MintBadge(MintBadgePayload),
}

pub const VALID_GAME_RESULTS: [&str; 3] = ["1-0", "0-1", "1/2-1/2"];

impl IntentPayload {
    pub fn kind(&self) -> IntentKind {
        match self {
            IntentPayload::CreateGame(_) => IntentKind::CreateGame,
            IntentPayload::MakeMove(_) => IntentKind::MakeMove,
            IntentPayload::EndGame(_) => IntentKind::EndGame,
            IntentPayload::MintBadge(_) => IntentKind::MintBadge,
        }
    }

    /// The game object this intent operates on, when the kind has one.
    /// Returns None for an unset (empty) id.
    pub fn game_object_id(&self) -> Option<&str> {
        let id = match self {
            IntentPayload::MakeMove(p) => p.game_object_id.as_str(),
            IntentPayload::EndGame(p) => p.game_object_id.as_str(),
            _ => return None,
        };
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn badge_type(&self) -> Option<&str> {
        match self {
            IntentPayload::MintBadge(p) => Some(p.badge_type.as_str()),
            _ => None,
        }
    }

    /// Shape validation applied at intake, before any row is persisted.
    pub fn validate(&self) -> Result<()> {
        match self {
            IntentPayload::CreateGame(p) => {
                if p.mode > 1 {
                    bail!("mode must be 0 or 1 (got {})", p.mode);
                }
                if p.difficulty > 2 {
                    bail!("difficulty must be 0, 1 or 2 (got {})", p.difficulty);
                }
            }
            IntentPayload::MakeMove(p) => {
                if !p.game_object_id.is_empty() {
                    validate_address(&p.game_object_id)?;
                }
                if p.san.is_empty() {
                    bail!("san must not be empty");
                }
                if p.fen.is_empty() {
                    bail!("fen must not be empty");
                }
                if p.move_hash.is_empty() {
                    bail!("move_hash must not be empty");
                }
            }
            IntentPayload::EndGame(p) => {
                validate_address(&p.game_object_id)?;
                if let Some(w) = &p.winner {
                    validate_address(w)?;
                }
                if !VALID_GAME_RESULTS.contains(&p.result.as_str()) {
                    bail!(
                        "result must be one of {:?} (got '{}')",
                        VALID_GAME_RESULTS,
                        p.result
                    );
                }
                if p.final_fen.is_empty() {
                    bail!("final_fen must not be empty");
                }
            }
            IntentPayload::MintBadge(p) => {
                validate_address(&p.recipient_address)?;
                if p.badge_type.is_empty() {
                    bail!("badge_type must not be empty");
                }
                if p.name.is_empty() {
                    bail!("name must not be empty");
                }
                url::Url::parse(&p.source_url)
                    .map_err(|e| anyhow!("source_url is not a valid URL: {}", e))?;
                if let Some(reg) = &p.registry_object_id {
                    validate_address(reg)?;
                }
            }
        }
        Ok(())
    }
}

/// Sui addresses and object ids: 0x-prefixed hex, at most 32 bytes.
pub fn validate_address(s: &str) -> Result<()> {
    let hex_part = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("address must start with 0x: '{}'", s))?;
    if hex_part.is_empty() || hex_part.len() > 64 {
        bail!("address must be 1..=64 hex chars after 0x: '{}'", s);
    }
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("address contains non-hex characters: '{}'", s);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Client → server request envelopes (one per event, spec'd field names)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub transaction_id: String,
    pub game_id: Uuid,
    pub player_address: String,
    pub data: CreateGamePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeMoveData {
    #[serde(default)]
    pub game_object_id: String,
    pub is_computer: bool,
    pub san: String,
    pub fen: String,
    pub move_hash: String,
    /// Logical game row; required when the parent game is not yet on-chain.
    #[serde(default)]
    pub game_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeMoveRequest {
    pub transaction_id: String,
    pub player_address: String,
    /// "pending" (default) or "waiting_for_object_id" when the caller knows
    /// the parent game has not been created on-chain yet.
    #[serde(default)]
    pub status: Option<String>,
    pub data: MakeMoveData,
}

impl MakeMoveRequest {
    pub fn waiting_for_parent(&self) -> bool {
        self.status.as_deref() == Some("waiting_for_object_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndGameRequest {
    pub transaction_id: String,
    pub player_address: String,
    pub data: EndGamePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintNftRequest {
    pub transaction_id: String,
    pub player_address: String,
    pub player_id: Uuid,
    pub data: MintBadgePayload,
}

/// Server-side reward request: mints whatever badge the eligibility engine
/// selects for `reward_type`'s family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftMintRequest {
    pub player_id: Uuid,
    pub player_sui_address: String,
    pub reward_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_and_status_roundtrip() {
        for k in [
            IntentKind::CreateGame,
            IntentKind::MakeMove,
            IntentKind::EndGame,
            IntentKind::MintBadge,
        ] {
            assert_eq!(IntentKind::parse(k.as_str()).unwrap(), k);
        }
        for s in [
            IntentStatus::Pending,
            IntentStatus::Processing,
            IntentStatus::Completed,
            IntentStatus::Failed,
            IntentStatus::WaitingForObjectId,
        ] {
            assert_eq!(IntentStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(IntentKind::parse("mint_nft").is_err());
    }

    #[test]
    fn payload_is_tagged_by_kind() {
        let p = IntentPayload::CreateGame(CreateGamePayload {
            mode: 0,
            difficulty: 1,
        });
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["kind"], "create_game");
        assert_eq!(v["mode"], 0);

        let back: IntentPayload = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind(), IntentKind::CreateGame);
    }

    #[test]
    fn create_game_bounds_enforced() {
        let bad_mode = IntentPayload::CreateGame(CreateGamePayload {
            mode: 2,
            difficulty: 0,
        });
        assert!(bad_mode.validate().is_err());

        let bad_difficulty = IntentPayload::CreateGame(CreateGamePayload {
            mode: 1,
            difficulty: 3,
        });
        assert!(bad_difficulty.validate().is_err());
    }

    #[test]
    fn end_game_result_must_be_known() {
        let mut p = EndGamePayload {
            game_object_id: "0xabc".to_string(),
            winner: None,
            result: "1-0".to_string(),
            final_fen: "8/8/8/8/8/8/8/8 w - - 0 1".to_string(),
        };
        assert!(IntentPayload::EndGame(p.clone()).validate().is_ok());

        p.result = "2-0".to_string();
        assert!(IntentPayload::EndGame(p).validate().is_err());
    }

    #[test]
    fn mint_badge_requires_valid_url() {
        let p = MintBadgePayload {
            recipient_address: "0xA1".to_string(),
            badge_type: "first_game".to_string(),
            name: "First Game".to_string(),
            description: "Played a first game".to_string(),
            source_url: "not a url".to_string(),
            registry_object_id: None,
        };
        let err = IntentPayload::MintBadge(p).validate().unwrap_err();
        assert!(err.to_string().contains("source_url"));
    }

    #[test]
    fn address_validation() {
        assert!(validate_address("0xA1b2").is_ok());
        assert!(validate_address("A1b2").is_err());
        assert!(validate_address("0x").is_err());
        assert!(validate_address("0xzz").is_err());
        assert!(validate_address(&format!("0x{}", "a".repeat(65))).is_err());
    }

    #[test]
    fn game_object_id_empty_reads_as_none() {
        let p = IntentPayload::MakeMove(MakeMovePayload {
            game_object_id: String::new(),
            is_computer: false,
            san: "e4".to_string(),
            fen: "fen".to_string(),
            move_hash: "h".to_string(),
        });
        assert!(p.game_object_id().is_none());
    }

    #[test]
    fn make_move_request_waiting_indicator() {
        let req: MakeMoveRequest = serde_json::from_value(json!({
            "transaction_id": "t2",
            "player_address": "0xA",
            "status": "waiting_for_object_id",
            "data": {
                "is_computer": false,
                "san": "e4",
                "fen": "fen",
                "move_hash": "h",
                "game_id": "6f2c63ea-1c5b-4f0f-9f6a-3e1cfc39c6d1"
            }
        }))
        .unwrap();
        assert!(req.waiting_for_parent());
        assert_eq!(req.data.game_object_id, "");
    }
}
