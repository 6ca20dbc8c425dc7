//! Postgres store for blockchess-relay.
//!
//! All operations are free async functions over `&PgPool`. The queue table
//! and its claim protocol live in [`queue`]; reconciliation against the
//! games/players/rewards tables and the eligibility views live in [`game`].

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "BCR_DATABASE_URL";

pub mod game;
pub mod queue;

pub use game::{
    find_player_id_by_address, granted_badge_types, in_no_first_game_created_view,
    in_no_first_game_view, player_exists, reward_exists, set_game_object_id, upsert_reward,
    victories_total,
};
pub use queue::{
    claim_next, delete_intent, enqueue, fetch_intent, gc_old, increment_retries,
    list_active_actors, list_waiting_for_game, mark_completed, mark_failed, mint_badge_exists,
    requeue_pending, reset_stuck_processing, unblock_waiting, IntentRow, NewIntent,
};

/// Connect to Postgres using BCR_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test helper used by integration tests:
/// - Connect using BCR_DATABASE_URL
/// - Ensure migrations are applied
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_queue_table: bool,
}

/// Connectivity + schema presence probe.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='transaction_queue'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_queue_table: exists,
    })
}
