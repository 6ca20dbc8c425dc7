//! The dispatcher: scans the queue for actors with pending work and fans out
//! at most one worker per actor.
//!
//! Single-flight per actor is enforced at two layers: the process-local
//! in-flight set here, and the store's `FOR UPDATE SKIP LOCKED` claim. Either
//! suffices for one dispatcher process; together they allow several without
//! coordination.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info, warn};

use bcr_chain::ChainGateway;
use bcr_config::QueueConfig;
use bcr_events::EventSink;

mod worker;

pub use worker::backoff_delay_ms;

const SCAN_ACTOR_LIMIT: i64 = 100;
const GC_INTERVAL: Duration = Duration::from_secs(3600);

pub struct Dispatcher {
    pool: PgPool,
    gateway: Arc<dyn ChainGateway>,
    sink: Arc<dyn EventSink>,
    cfg: QueueConfig,
    in_flight: Mutex<HashSet<String>>,
    shutting_down: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn ChainGateway>,
        sink: Arc<dyn EventSink>,
        cfg: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            gateway,
            sink,
            cfg,
            in_flight: Mutex::new(HashSet::new()),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Main loop: scan every `processing_interval_ms`, GC hourly, stop on the
    /// shutdown signal after in-flight workers finish their current attempt.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.cfg.processing_interval_ms,
            max_retries = self.cfg.max_retries,
            "dispatcher started"
        );

        let mut scan = tokio::time::interval(Duration::from_millis(
            self.cfg.processing_interval_ms.max(1),
        ));
        scan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut gc = tokio::time::interval(GC_INTERVAL);
        // The immediate first tick; GC on boot clears any backlog.
        gc.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scan.tick() => {
                    if let Err(e) = Arc::clone(&self).scan_once().await {
                        // Next tick continues regardless.
                        error!(error = %format!("{e:#}"), "queue scan failed");
                    }
                }
                _ = gc.tick() => {
                    let pool = self.pool.clone();
                    tokio::spawn(async move {
                        match bcr_db::gc_old(&pool).await {
                            Ok(n) if n > 0 => info!(deleted = n, "queue gc"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %format!("{e:#}"), "queue gc failed"),
                        }
                    });
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        self.shutting_down.store(true, Ordering::SeqCst);
        info!("dispatcher stopping; waiting for in-flight workers");
        while !self.in_flight.lock().expect("in-flight set poisoned").is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!("dispatcher stopped");
    }

    /// One scan pass: list actors with pending work (oldest first, bounded)
    /// and spawn a worker for each actor not already being drained.
    pub async fn scan_once(self: Arc<Self>) -> anyhow::Result<()> {
        let actors = bcr_db::list_active_actors(&self.pool, SCAN_ACTOR_LIMIT).await?;

        for actor in actors {
            if !self.begin_actor(&actor) {
                continue;
            }

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let _guard = InFlightGuard {
                    dispatcher: &this,
                    actor: &actor,
                };
                if let Err(e) = this.drain_actor(&actor).await {
                    error!(actor = %actor, error = %format!("{e:#}"), "worker aborted");
                }
            });
        }

        Ok(())
    }

    /// Atomic test-and-insert into the in-flight set. No new workers are
    /// started once shutdown has been requested.
    fn begin_actor(&self, actor: &str) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .insert(actor.to_string())
    }

    fn end_actor(&self, actor: &str) {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(actor);
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Removes the actor from the in-flight set on every worker exit path,
/// including panics.
struct InFlightGuard<'a> {
    dispatcher: &'a Dispatcher,
    actor: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.end_actor(self.actor);
    }
}
