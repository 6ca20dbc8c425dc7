//! Shared test doubles and seeding helpers for scenario tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use bcr_chain::ChainGateway;
use bcr_schemas::IntentPayload;

/// Scripted [`ChainGateway`]: submit/extract outcomes pop from queues in
/// order; once a queue is exhausted, calls succeed with generated ids.
/// An optional artificial delay simulates slow chain round-trips.
#[derive(Default)]
pub struct MockGateway {
    submit_script: Mutex<VecDeque<std::result::Result<String, String>>>,
    extract_script: Mutex<VecDeque<Option<String>>>,
    submitted: Mutex<Vec<IntentPayload>>,
    submit_delay_ms: AtomicU64,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next submit outcome: Ok(digest) or Err(chain error string).
    pub fn script_submit(&self, outcome: std::result::Result<&str, &str>) {
        self.submit_script.lock().unwrap().push_back(
            outcome
                .map(str::to_string)
                .map_err(str::to_string),
        );
    }

    /// Queue the next wait_and_extract outcome.
    pub fn script_extract(&self, object_id: Option<&str>) {
        self.extract_script
            .lock()
            .unwrap()
            .push_back(object_id.map(str::to_string));
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Every payload passed to `submit`, in call order.
    pub fn submitted(&self) -> Vec<IntentPayload> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn submit(&self, payload: &IntentPayload) -> Result<String> {
        let delay = self.submit_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.submitted.lock().unwrap().push(payload.clone());

        let scripted = self.submit_script.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(digest)) => Ok(digest),
            Some(Err(msg)) => Err(anyhow!("{msg}")),
            None => Ok(format!(
                "digest-{}",
                self.counter.fetch_add(1, Ordering::Relaxed)
            )),
        }
    }

    async fn wait_and_extract(&self, _digest: &str, _pattern: &str) -> Result<Option<String>> {
        let scripted = self.extract_script.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => Ok(outcome),
            None => Ok(Some(format!(
                "0xobj{}",
                self.counter.fetch_add(1, Ordering::Relaxed)
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DB seeding helpers
// ---------------------------------------------------------------------------

/// Fresh random actor address for test isolation.
pub fn random_actor() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

pub async fn seed_player(pool: &PgPool, address: &str) -> Result<Uuid> {
    let (player_id,): (Uuid,) =
        sqlx::query_as("insert into players (sui_address) values ($1) returning id")
            .bind(address)
            .fetch_one(pool)
            .await?;
    Ok(player_id)
}

pub async fn seed_game(pool: &PgPool, creator_id: Uuid) -> Result<Uuid> {
    let (game_id,): (Uuid,) =
        sqlx::query_as("insert into games (creator_id) values ($1) returning id")
            .bind(creator_id)
            .fetch_one(pool)
            .await?;
    Ok(game_id)
}

pub async fn seed_win(pool: &PgPool, player_id: Uuid) -> Result<()> {
    sqlx::query(
        "insert into games (creator_id, white_player_id, winner_id, result) \
         values ($1, $1, $1, '1-0')",
    )
    .bind(player_id)
    .execute(pool)
    .await?;
    Ok(())
}
