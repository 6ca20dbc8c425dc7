//! `transaction_queue` operations: durable per-actor FIFO with crash-safe
//! claims.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent dispatcher processes
//! never block on (or double-claim) each other's rows. Within one actor the
//! oldest `pending` row wins; ties break on the insertion sequence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use bcr_schemas::{IntentKind, IntentPayload, IntentStatus};

#[derive(Debug, Clone)]
pub struct IntentRow {
    pub id: String,
    pub kind: IntentKind,
    /// Originating player address; None only for system-generated intents.
    pub actor: Option<String>,
    pub game_ref: Option<Uuid>,
    pub player_ref: Option<Uuid>,
    pub status: IntentStatus,
    pub payload: IntentPayload,
    pub error_message: Option<String>,
    pub retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewIntent {
    pub id: String,
    pub actor: Option<String>,
    pub game_ref: Option<Uuid>,
    pub player_ref: Option<Uuid>,
    /// Initial status: `Pending`, or `WaitingForObjectId` for a move whose
    /// parent game is not yet on-chain. Inserted directly in the terminal
    /// intended status so the dispatcher can never claim a half-born row.
    pub status: IntentStatus,
    pub payload: IntentPayload,
}

const ROW_COLUMNS: &str = "id, kind, player_sui_address, game_id, player_id, status, payload, \
                           error_message, retries, created_at, updated_at, processed_at";

fn row_to_intent(row: &PgRow) -> Result<IntentRow> {
    let payload_json: serde_json::Value = row.try_get("payload")?;
    let payload: IntentPayload = serde_json::from_value(payload_json)
        .context("queue row payload does not match its kind schema")?;

    Ok(IntentRow {
        id: row.try_get("id")?,
        kind: IntentKind::parse(&row.try_get::<String, _>("kind")?)?,
        actor: row.try_get("player_sui_address")?,
        game_ref: row.try_get("game_id")?,
        player_ref: row.try_get("player_id")?,
        status: IntentStatus::parse(&row.try_get::<String, _>("status")?)?,
        payload,
        error_message: row.try_get("error_message")?,
        retries: row.try_get("retries")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// Insert a new intent row.
///
/// Idempotent: returns Ok(false) without inserting when the `id` already
/// exists, or when a racing MintBadge for the same (player, badge) hit the
/// `uq_queue_mint_badge_once` backstop index. The [`mint_badge_exists`]
/// pre-check catches the common duplicate before the insert is attempted.
pub async fn enqueue(pool: &PgPool, intent: &NewIntent) -> Result<bool> {
    let payload =
        serde_json::to_value(&intent.payload).context("serialize intent payload failed")?;

    let res: sqlx::Result<Option<(String,)>> = sqlx::query_as(
        r#"
        insert into transaction_queue (id, kind, player_sui_address, game_id, player_id, status, payload)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (id) do nothing
        returning id
        "#,
    )
    .bind(&intent.id)
    .bind(intent.payload.kind().as_str())
    .bind(&intent.actor)
    .bind(intent.game_ref)
    .bind(intent.player_ref)
    .bind(intent.status.as_str())
    .bind(payload)
    .fetch_optional(pool)
    .await;

    match res {
        Ok(row) => Ok(row.is_some()),
        Err(e) if is_unique_constraint_violation(&e, "uq_queue_mint_badge_once") => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("enqueue failed")),
    }
}

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                || (db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint))
        }
        _ => false,
    }
}

/// Does a MintBadge row for `(actor, player_ref, badge_type)` already exist
/// in {pending, processing, completed}? Intake's I3 pre-check.
pub async fn mint_badge_exists(
    pool: &PgPool,
    actor: &str,
    player_ref: Uuid,
    badge_type: &str,
) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1
            from transaction_queue
            where kind = 'mint_badge'
              and player_sui_address = $1
              and player_id = $2
              and payload->>'badge_type' = $3
              and status in ('pending', 'processing', 'completed')
        )
        "#,
    )
    .bind(actor)
    .bind(player_ref)
    .bind(badge_type)
    .fetch_one(pool)
    .await
    .context("mint_badge_exists failed")?;

    Ok(exists)
}

/// Atomically claim the oldest `pending` row for `actor`: pending → processing.
///
/// `FOR UPDATE SKIP LOCKED` skips rows currently locked by another dispatcher
/// process instead of blocking, so at most one worker ever holds a given row.
/// Returns None when the actor has no claimable work.
pub async fn claim_next(pool: &PgPool, actor: &str) -> Result<Option<IntentRow>> {
    let row = sqlx::query(&format!(
        r#"
        with next_intent as (
            select id as claim_id
            from transaction_queue
            where status = 'pending'
              and player_sui_address = $1
            order by created_at asc, seq asc
            limit 1
            for update skip locked
        )
        update transaction_queue q
           set status = 'processing',
               updated_at = now()
          from next_intent
         where q.id = next_intent.claim_id
        returning {ROW_COLUMNS}
        "#
    ))
    .bind(actor)
    .fetch_optional(pool)
    .await
    .context("claim_next failed")?;

    match row {
        Some(row) => Ok(Some(row_to_intent(&row)?)),
        None => Ok(None),
    }
}

/// Distinct actors with at least one `pending` row, ordered by each actor's
/// oldest pending row (global FIFO fairness across actors).
pub async fn list_active_actors(pool: &PgPool, limit: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        select player_sui_address
        from transaction_queue
        where status = 'pending'
          and player_sui_address is not null
        group by player_sui_address
        order by min(created_at) asc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_active_actors failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(row.try_get::<String, _>("player_sui_address")?);
    }
    Ok(out)
}

pub async fn mark_completed(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update transaction_queue
           set status = 'completed',
               updated_at = now(),
               processed_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("mark_completed failed")?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update transaction_queue
           set status = 'failed',
               error_message = $2,
               updated_at = now(),
               processed_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await
    .context("mark_failed failed")?;
    Ok(())
}

/// Return a row to `pending` for another attempt, recording the error that
/// sent it back. Position in the actor's FIFO is preserved: ordering is by
/// `created_at`, which never changes.
pub async fn requeue_pending(pool: &PgPool, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update transaction_queue
           set status = 'pending',
               error_message = $2,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await
    .context("requeue_pending failed")?;
    Ok(())
}

/// Atomic retries += 1; returns the new count.
pub async fn increment_retries(pool: &PgPool, id: &str) -> Result<i32> {
    let (retries,): (i32,) = sqlx::query_as(
        r#"
        update transaction_queue
           set retries = retries + 1,
               updated_at = now()
         where id = $1
        returning retries
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .context("increment_retries failed")?;
    Ok(retries)
}

pub async fn delete_intent(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query("delete from transaction_queue where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_intent failed")?;
    Ok(())
}

pub async fn fetch_intent(pool: &PgPool, id: &str) -> Result<Option<IntentRow>> {
    let row = sqlx::query(&format!(
        "select {ROW_COLUMNS} from transaction_queue where id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_intent failed")?;

    match row {
        Some(row) => Ok(Some(row_to_intent(&row)?)),
        None => Ok(None),
    }
}

/// All rows parked in `waiting_for_object_id` for a given game, oldest first.
pub async fn list_waiting_for_game(pool: &PgPool, game_ref: Uuid) -> Result<Vec<IntentRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {ROW_COLUMNS}
        from transaction_queue
        where status = 'waiting_for_object_id'
          and game_id = $1
        order by created_at asc, seq asc
        "#
    ))
    .bind(game_ref)
    .fetch_all(pool)
    .await
    .context("list_waiting_for_game failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(row_to_intent(&row)?);
    }
    Ok(out)
}

/// Fill in the parent game's object id and release the row to `pending`.
///
/// Guarded on the current status so a row is unblocked at most once; returns
/// true if this call performed the transition.
pub async fn unblock_waiting(pool: &PgPool, id: &str, object_id: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update transaction_queue
           set payload = jsonb_set(payload, '{game_object_id}', to_jsonb($2::text)),
               status = 'pending',
               updated_at = now()
         where id = $1
           and status = 'waiting_for_object_id'
        returning id
        "#,
    )
    .bind(id)
    .bind(object_id)
    .fetch_optional(pool)
    .await
    .context("unblock_waiting failed")?;

    Ok(row.is_some())
}

/// Delete terminal rows older than 24 hours. Never touches live statuses.
pub async fn gc_old(pool: &PgPool) -> Result<u64> {
    let res = sqlx::query(
        r#"
        delete from transaction_queue
        where status in ('completed', 'failed')
          and updated_at < now() - interval '24 hours'
        "#,
    )
    .execute(pool)
    .await
    .context("gc_old failed")?;
    Ok(res.rows_affected())
}

/// Operator tool: return rows stranded in `processing` (dispatcher died
/// between claim and outcome) to `pending`. Returns the number of rows reset.
pub async fn reset_stuck_processing(pool: &PgPool, older_than_secs: i64) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update transaction_queue
           set status = 'pending',
               updated_at = now()
         where status = 'processing'
           and updated_at < now() - make_interval(secs => $1::double precision)
        "#,
    )
    .bind(older_than_secs as f64)
    .execute(pool)
    .await
    .context("reset_stuck_processing failed")?;
    Ok(res.rows_affected())
}
