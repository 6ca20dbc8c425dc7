//! Shared runtime state for the server.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;

use bcr_events::RoomHub;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers and WS sessions.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub hub: Arc<RoomHub>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, hub: Arc<RoomHub>) -> Self {
        Self {
            pool,
            hub,
            build: BuildInfo {
                service: "blockchess-relay",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
