//! Reconciliation against the games/players/rewards tables, plus the
//! read-only eligibility view queries consumed by the rewards engine.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Record a game's on-chain object id. Idempotent: re-running after a crash
/// overwrites with the same value.
pub async fn set_game_object_id(pool: &PgPool, game_ref: Uuid, object_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update games
           set object_id = $2,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(game_ref)
    .bind(object_id)
    .execute(pool)
    .await
    .context("set_game_object_id failed")?;
    Ok(())
}

pub async fn find_player_id_by_address(pool: &PgPool, address: &str) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("select id from players where sui_address = $1")
        .bind(address)
        .fetch_optional(pool)
        .await
        .context("find_player_id_by_address failed")?;
    Ok(row.map(|(id,)| id))
}

pub async fn player_exists(pool: &PgPool, player_id: Uuid) -> Result<bool> {
    let (exists,): (bool,) =
        sqlx::query_as("select exists (select 1 from players where id = $1)")
            .bind(player_id)
            .fetch_one(pool)
            .await
            .context("player_exists failed")?;
    Ok(exists)
}

/// Insert-or-update the granted reward row for `(player_ref, badge_type)`,
/// stamping the minted badge's object id. Exactly-once per badge is enforced
/// by the unique constraint; replays just refresh `object_id`.
pub async fn upsert_reward(
    pool: &PgPool,
    player_ref: Uuid,
    badge_type: &str,
    object_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into rewards (player_id, badge_type, object_id)
        values ($1, $2, $3)
        on conflict on constraint uq_rewards_player_badge do update
            set object_id = excluded.object_id,
                updated_at = now()
        "#,
    )
    .bind(player_ref)
    .bind(badge_type)
    .bind(object_id)
    .execute(pool)
    .await
    .context("upsert_reward failed")?;
    Ok(())
}

pub async fn reward_exists(pool: &PgPool, player_ref: Uuid, badge_type: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "select exists (select 1 from rewards where player_id = $1 and badge_type = $2)",
    )
    .bind(player_ref)
    .bind(badge_type)
    .fetch_one(pool)
    .await
    .context("reward_exists failed")?;
    Ok(exists)
}

/// Badge types already granted to a player.
pub async fn granted_badge_types(pool: &PgPool, player_ref: Uuid) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("select badge_type from rewards where player_id = $1")
            .bind(player_ref)
            .fetch_all(pool)
            .await
            .context("granted_badge_types failed")?;
    Ok(rows.into_iter().map(|(b,)| b).collect())
}

// ---------------------------------------------------------------------------
// Eligibility views (read-only)
// ---------------------------------------------------------------------------

pub async fn in_no_first_game_view(pool: &PgPool, player_id: Uuid) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "select exists (select 1 from vw_users_no_first_game where player_id = $1)",
    )
    .bind(player_id)
    .fetch_one(pool)
    .await
    .context("vw_users_no_first_game query failed")?;
    Ok(exists)
}

pub async fn in_no_first_game_created_view(pool: &PgPool, player_id: Uuid) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "select exists (select 1 from vw_users_no_first_game_created where player_id = $1)",
    )
    .bind(player_id)
    .fetch_one(pool)
    .await
    .context("vw_users_no_first_game_created query failed")?;
    Ok(exists)
}

pub async fn victories_total(pool: &PgPool, player_id: Uuid) -> Result<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("select victories from vw_users_victories where player_id = $1")
            .bind(player_id)
            .fetch_optional(pool)
            .await
            .context("vw_users_victories query failed")?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}
