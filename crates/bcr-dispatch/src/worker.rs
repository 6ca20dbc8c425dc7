//! Per-actor worker: drains one actor's queue strictly in order, one intent
//! attempt at a time, with retry/backoff and per-kind reconciliation.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use bcr_chain::{backoff_base_ms, classify, is_suppressed, ErrorClass};
use bcr_db::IntentRow;
use bcr_events::{
    now_ts, player_room, EventSink, ProcessingEvent, ResultEvent, EV_PROCESSING, EV_RESULT,
};
use bcr_schemas::{IntentKind, IntentPayload};

use crate::Dispatcher;

/// Created-object type patterns handed to wait_and_extract.
const GAME_TYPE_PATTERN: &str = "::game::Game";
const BADGE_TYPE_PATTERN: &str = "badge::Badge";

/// Linear backoff: `base × attempt`.
pub fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(attempt as u64)
}

/// What a successfully processed intent reports back to the client.
struct Finished {
    digest: String,
    object_id: Option<String>,
    reward_name: Option<String>,
    badge_type: Option<String>,
}

impl Dispatcher {
    /// Claim-process loop for one actor. Exits when the actor has no more
    /// claimable work or shutdown was requested between attempts.
    pub async fn drain_actor(&self, actor: &str) -> Result<()> {
        let room = player_room(actor);

        loop {
            if self.is_shutting_down() {
                debug!(actor, "worker yielding for shutdown");
                return Ok(());
            }

            let Some(intent) = bcr_db::claim_next(&self.pool, actor).await? else {
                return Ok(());
            };

            self.sink.emit(
                &room,
                EV_PROCESSING,
                serde_json::to_value(ProcessingEvent {
                    id: intent.id.clone(),
                    status: "processing".to_string(),
                    ts: now_ts(),
                })
                .expect("event serialization"),
            );

            match self.process(&intent).await {
                Ok(finished) => {
                    bcr_db::mark_completed(&self.pool, &intent.id).await?;
                    // Completed rows are not retained.
                    bcr_db::delete_intent(&self.pool, &intent.id).await?;

                    let mut event = ResultEvent::success(&intent.id, &finished.digest);
                    event.object_id = finished.object_id;
                    event.reward_name = finished.reward_name;
                    event.badge_type = finished.badge_type;
                    self.sink.emit(
                        &room,
                        EV_RESULT,
                        serde_json::to_value(event).expect("event serialization"),
                    );

                    info!(actor, id = %intent.id, kind = intent.kind.as_str(), "intent completed");
                }
                Err(err) => {
                    self.handle_failure(&intent, &room, err).await?;
                }
            }
        }
    }

    /// Submit and reconcile one intent. Store reconciliation errors after a
    /// successful submit are logged and swallowed: the on-chain effect is
    /// already durable.
    async fn process(&self, intent: &IntentRow) -> Result<Finished> {
        let digest = self.gateway.submit(&intent.payload).await?;

        match &intent.payload {
            IntentPayload::CreateGame(_) => {
                let object_id = self
                    .gateway
                    .wait_and_extract(&digest, GAME_TYPE_PATTERN)
                    .await?;

                if let (Some(object_id), Some(game_ref)) = (&object_id, intent.game_ref) {
                    if let Err(e) = self.reconcile_created_game(game_ref, object_id).await {
                        warn!(
                            id = %intent.id,
                            error = %format!("{e:#}"),
                            "game reconciliation failed after successful submit"
                        );
                    }
                }

                Ok(Finished {
                    digest,
                    object_id,
                    reward_name: None,
                    badge_type: None,
                })
            }

            IntentPayload::MakeMove(_) | IntentPayload::EndGame(_) => Ok(Finished {
                digest,
                object_id: None,
                reward_name: None,
                badge_type: None,
            }),

            IntentPayload::MintBadge(p) => {
                let object_id = self
                    .gateway
                    .wait_and_extract(&digest, BADGE_TYPE_PATTERN)
                    .await?;

                if let (Some(object_id), Some(player_ref)) = (&object_id, intent.player_ref) {
                    if let Err(e) =
                        bcr_db::upsert_reward(&self.pool, player_ref, &p.badge_type, object_id)
                            .await
                    {
                        warn!(
                            id = %intent.id,
                            error = %format!("{e:#}"),
                            "reward reconciliation failed after successful mint"
                        );
                    }
                }

                Ok(Finished {
                    digest,
                    object_id,
                    reward_name: Some(p.name.clone()),
                    badge_type: Some(p.badge_type.clone()),
                })
            }
        }
    }

    /// Record the game's on-chain id and release every intent parked on it.
    async fn reconcile_created_game(
        &self,
        game_ref: uuid::Uuid,
        object_id: &str,
    ) -> Result<()> {
        bcr_db::set_game_object_id(&self.pool, game_ref, object_id)
            .await
            .context("set_game_object_id")?;

        let waiting = bcr_db::list_waiting_for_game(&self.pool, game_ref)
            .await
            .context("list_waiting_for_game")?;
        for row in waiting {
            if bcr_db::unblock_waiting(&self.pool, &row.id, object_id).await? {
                debug!(id = %row.id, %game_ref, "unblocked waiting intent");
            }
        }
        Ok(())
    }

    /// Failure policy: bump retries, requeue with backoff below the cap, mark
    /// failed at the cap. Suppressed classes never reach the client.
    async fn handle_failure(
        &self,
        intent: &IntentRow,
        room: &str,
        err: anyhow::Error,
    ) -> Result<()> {
        let message = format!("{err:#}");
        let class = classify(intent.kind, &message);

        if class == ErrorClass::Authorization {
            error!(
                id = %intent.id,
                "mint rejected with abort code 1: the sponsor address is not the registry's \
                 authorized minter; rotate it with the set-authorized-minter command"
            );
        }

        // New value == this attempt's number.
        let attempt = bcr_db::increment_retries(&self.pool, &intent.id).await?;

        if attempt >= self.cfg.max_retries as i32 {
            bcr_db::mark_failed(&self.pool, &intent.id, &message).await?;
            warn!(
                id = %intent.id,
                kind = intent.kind.as_str(),
                attempts = attempt,
                error = %message,
                "intent failed permanently"
            );

            if !is_suppressed(intent.kind, class) {
                self.sink.emit(
                    room,
                    EV_RESULT,
                    serde_json::to_value(ResultEvent::error(&intent.id, &message))
                        .expect("event serialization"),
                );
            }

            // Failed MintBadge rows are kept as a paper trail.
            if intent.kind != IntentKind::MintBadge {
                bcr_db::delete_intent(&self.pool, &intent.id).await?;
            }
        } else {
            bcr_db::requeue_pending(&self.pool, &intent.id, &message).await?;
            let base = backoff_base_ms(intent.kind, class, self.cfg.retry_base_delay_ms);
            let delay = backoff_delay_ms(base, attempt as u32);
            debug!(
                id = %intent.id,
                attempt,
                delay_ms = delay,
                error = %message,
                "intent requeued"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_in_attempt() {
        assert_eq!(backoff_delay_ms(5000, 1), 5000);
        assert_eq!(backoff_delay_ms(5000, 2), 10000);
        assert_eq!(backoff_delay_ms(2000, 3), 6000);
    }

    #[test]
    fn backoff_saturates() {
        assert_eq!(backoff_delay_ms(u64::MAX, 2), u64::MAX);
    }
}
