//! Intake: validate, deduplicate, persist, acknowledge.
//!
//! Every client intent passes through here before it exists durably.
//! Validation failures are returned to the caller (the WS session surfaces
//! them as `error` events) and nothing is persisted. Duplicate reward
//! requests are dropped silently.

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use bcr_events::{
    now_ts, player_room, EventSink, MintTaskQueuedEvent, QueuedEvent, EV_MINT_TASK_QUEUED,
    EV_QUEUED,
};
use bcr_schemas::{
    validate_address, CreateGameRequest, EndGameRequest, IntentPayload, IntentStatus,
    MakeMoveRequest, MintBadgePayload, MintNftRequest, NftMintRequest,
};

/// Outcome of an accepted (or silently dropped) intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    Queued { intent_id: String },
    Waiting { intent_id: String },
    /// Duplicate reward: nothing persisted, nothing emitted.
    Dropped,
}

fn require_transaction_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("transaction_id must not be empty");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pure validation (unit-testable without a store)
// ---------------------------------------------------------------------------

pub fn validate_create_game(req: &CreateGameRequest) -> Result<IntentPayload> {
    require_transaction_id(&req.transaction_id)?;
    validate_address(&req.player_address)?;
    let payload = IntentPayload::CreateGame(req.data.clone());
    payload.validate()?;
    Ok(payload)
}

pub fn validate_make_move(req: &MakeMoveRequest) -> Result<IntentPayload> {
    require_transaction_id(&req.transaction_id)?;
    validate_address(&req.player_address)?;

    if req.waiting_for_parent() {
        if req.data.game_id.is_none() {
            bail!("waiting_for_object_id requires data.game_id");
        }
    } else if req.data.game_object_id.is_empty() {
        bail!("game_object_id must be set unless status is waiting_for_object_id");
    }

    let payload = IntentPayload::MakeMove(bcr_schemas::MakeMovePayload {
        game_object_id: req.data.game_object_id.clone(),
        is_computer: req.data.is_computer,
        san: req.data.san.clone(),
        fen: req.data.fen.clone(),
        move_hash: req.data.move_hash.clone(),
    });
    payload.validate()?;
    Ok(payload)
}

pub fn validate_end_game(req: &EndGameRequest) -> Result<IntentPayload> {
    require_transaction_id(&req.transaction_id)?;
    validate_address(&req.player_address)?;
    let payload = IntentPayload::EndGame(req.data.clone());
    payload.validate()?;
    Ok(payload)
}

pub fn validate_mint_nft(req: &MintNftRequest) -> Result<IntentPayload> {
    require_transaction_id(&req.transaction_id)?;
    validate_address(&req.player_address)?;
    let payload = IntentPayload::MintBadge(req.data.clone());
    payload.validate()?;
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Accept paths
// ---------------------------------------------------------------------------

pub async fn accept_create_game(
    pool: &PgPool,
    sink: &dyn EventSink,
    req: &CreateGameRequest,
) -> Result<Accepted> {
    let payload = validate_create_game(req)?;

    bcr_db::enqueue(
        pool,
        &bcr_db::NewIntent {
            id: req.transaction_id.clone(),
            actor: Some(req.player_address.clone()),
            game_ref: Some(req.game_id),
            player_ref: None,
            status: IntentStatus::Pending,
            payload,
        },
    )
    .await?;

    emit_queued(sink, &req.player_address, &req.transaction_id, "queued");
    Ok(Accepted::Queued {
        intent_id: req.transaction_id.clone(),
    })
}

pub async fn accept_make_move(
    pool: &PgPool,
    sink: &dyn EventSink,
    req: &MakeMoveRequest,
) -> Result<Accepted> {
    let payload = validate_make_move(req)?;

    // Born directly in its terminal intended status; there is no pending
    // window the dispatcher could claim before the parent game exists.
    let (status, ack) = if req.waiting_for_parent() {
        (IntentStatus::WaitingForObjectId, "waiting_for_object_id")
    } else {
        (IntentStatus::Pending, "queued")
    };

    bcr_db::enqueue(
        pool,
        &bcr_db::NewIntent {
            id: req.transaction_id.clone(),
            actor: Some(req.player_address.clone()),
            game_ref: req.data.game_id,
            player_ref: None,
            status,
            payload,
        },
    )
    .await?;

    emit_queued(sink, &req.player_address, &req.transaction_id, ack);
    if ack == "queued" {
        Ok(Accepted::Queued {
            intent_id: req.transaction_id.clone(),
        })
    } else {
        Ok(Accepted::Waiting {
            intent_id: req.transaction_id.clone(),
        })
    }
}

pub async fn accept_end_game(
    pool: &PgPool,
    sink: &dyn EventSink,
    req: &EndGameRequest,
) -> Result<Accepted> {
    let payload = validate_end_game(req)?;

    bcr_db::enqueue(
        pool,
        &bcr_db::NewIntent {
            id: req.transaction_id.clone(),
            actor: Some(req.player_address.clone()),
            game_ref: None,
            player_ref: None,
            status: IntentStatus::Pending,
            payload,
        },
    )
    .await?;

    emit_queued(sink, &req.player_address, &req.transaction_id, "queued");
    Ok(Accepted::Queued {
        intent_id: req.transaction_id.clone(),
    })
}

/// Client-requested badge mint. Applies the duplicate pre-check: a second
/// request for the same `(actor, player, badge_type)` is dropped without a
/// trace beyond a debug log.
pub async fn accept_mint_nft(
    pool: &PgPool,
    sink: &dyn EventSink,
    req: &MintNftRequest,
) -> Result<Accepted> {
    let payload = validate_mint_nft(req)?;

    if bcr_db::mint_badge_exists(pool, &req.player_address, req.player_id, &req.data.badge_type)
        .await?
    {
        tracing::debug!(
            actor = %req.player_address,
            badge_type = %req.data.badge_type,
            "duplicate mint request dropped"
        );
        return Ok(Accepted::Dropped);
    }

    let inserted = bcr_db::enqueue(
        pool,
        &bcr_db::NewIntent {
            id: req.transaction_id.clone(),
            actor: Some(req.player_address.clone()),
            game_ref: None,
            player_ref: Some(req.player_id),
            status: IntentStatus::Pending,
            payload,
        },
    )
    .await?;
    if !inserted {
        // Lost a race with an identical request; the winner already acked.
        return Ok(Accepted::Dropped);
    }

    emit_queued(sink, &req.player_address, &req.transaction_id, "queued");
    Ok(Accepted::Queued {
        intent_id: req.transaction_id.clone(),
    })
}

/// Server-side reward path: eligibility decides which badge (if any) to
/// mint, the queue pre-check guarantees it is only ever queued once, and the
/// payload is synthesized from the catalog entry.
pub async fn request_reward(
    pool: &PgPool,
    sink: &dyn EventSink,
    req: &NftMintRequest,
) -> Result<Accepted> {
    validate_address(&req.player_sui_address)?;

    if !bcr_db::player_exists(pool, req.player_id).await? {
        bail!("unknown player {}", req.player_id);
    }

    let Some(entry) = bcr_rewards::decide(pool, &req.player_sui_address, &req.reward_type)
        .await
        .context("eligibility decision failed")?
    else {
        tracing::debug!(
            actor = %req.player_sui_address,
            reward_type = %req.reward_type,
            "no badge due"
        );
        return Ok(Accepted::Dropped);
    };

    if bcr_db::mint_badge_exists(pool, &req.player_sui_address, req.player_id, entry.badge_type)
        .await?
    {
        tracing::debug!(
            actor = %req.player_sui_address,
            badge_type = entry.badge_type,
            "reward already in queue"
        );
        return Ok(Accepted::Dropped);
    }

    let task_id = format!("mint-{}", Uuid::new_v4());
    let inserted = bcr_db::enqueue(
        pool,
        &bcr_db::NewIntent {
            id: task_id.clone(),
            actor: Some(req.player_sui_address.clone()),
            game_ref: None,
            player_ref: Some(req.player_id),
            status: IntentStatus::Pending,
            payload: IntentPayload::MintBadge(MintBadgePayload {
                recipient_address: req.player_sui_address.clone(),
                badge_type: entry.badge_type.to_string(),
                name: entry.name.to_string(),
                description: entry.description.to_string(),
                source_url: entry.source_url.to_string(),
                registry_object_id: None,
            }),
        },
    )
    .await?;
    if !inserted {
        // Lost a race with a concurrent identical request.
        return Ok(Accepted::Dropped);
    }

    sink.emit(
        &player_room(&req.player_sui_address),
        EV_MINT_TASK_QUEUED,
        serde_json::to_value(MintTaskQueuedEvent {
            task_id: task_id.clone(),
            // The badge actually chosen; may differ from the requested kind.
            reward_type: entry.badge_type.to_string(),
            player_id: req.player_id,
            player_sui_address: req.player_sui_address.clone(),
        })
        .expect("event serialization"),
    );

    Ok(Accepted::Queued { intent_id: task_id })
}

fn emit_queued(sink: &dyn EventSink, actor: &str, intent_id: &str, status: &str) {
    sink.emit(
        &player_room(actor),
        EV_QUEUED,
        serde_json::to_value(QueuedEvent {
            id: intent_id.to_string(),
            status: status.to_string(),
            ts: now_ts(),
        })
        .expect("event serialization"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcr_schemas::{CreateGamePayload, EndGamePayload, MakeMoveData};

    fn create_game_request() -> CreateGameRequest {
        CreateGameRequest {
            transaction_id: "t1".to_string(),
            game_id: Uuid::new_v4(),
            player_address: "0xa1".to_string(),
            data: CreateGamePayload {
                mode: 0,
                difficulty: 1,
            },
        }
    }

    #[test]
    fn create_game_rejects_out_of_range_mode() {
        let mut req = create_game_request();
        req.data.mode = 5;
        assert!(validate_create_game(&req).is_err());
    }

    #[test]
    fn create_game_rejects_empty_transaction_id() {
        let mut req = create_game_request();
        req.transaction_id.clear();
        assert!(validate_create_game(&req).is_err());
    }

    #[test]
    fn make_move_waiting_requires_game_id() {
        let req = MakeMoveRequest {
            transaction_id: "t2".to_string(),
            player_address: "0xa1".to_string(),
            status: Some("waiting_for_object_id".to_string()),
            data: MakeMoveData {
                game_object_id: String::new(),
                is_computer: false,
                san: "e4".to_string(),
                fen: "fen".to_string(),
                move_hash: "h".to_string(),
                game_id: None,
            },
        };
        let err = validate_make_move(&req).unwrap_err();
        assert!(err.to_string().contains("game_id"));
    }

    #[test]
    fn make_move_not_waiting_requires_object_id() {
        let req = MakeMoveRequest {
            transaction_id: "t2".to_string(),
            player_address: "0xa1".to_string(),
            status: None,
            data: MakeMoveData {
                game_object_id: String::new(),
                is_computer: false,
                san: "e4".to_string(),
                fen: "fen".to_string(),
                move_hash: "h".to_string(),
                game_id: None,
            },
        };
        assert!(validate_make_move(&req).is_err());
    }

    #[test]
    fn end_game_rejects_unknown_result() {
        let req = EndGameRequest {
            transaction_id: "t3".to_string(),
            player_address: "0xa1".to_string(),
            data: EndGamePayload {
                game_object_id: "0xg".to_string(),
                winner: None,
                result: "2-1".to_string(),
                final_fen: "fen".to_string(),
            },
        };
        assert!(validate_end_game(&req).is_err());
    }
}
