//! Badge eligibility: the static catalog and the read-only decision engine.
//!
//! The engine never writes; duplicate prevention is intake's job (queue
//! pre-check) backed by the rewards table's unique constraint.

use anyhow::Result;
use sqlx::PgPool;

pub mod catalog;

pub use catalog::{catalog, entry_for_badge, RewardCheck, RewardEntry};

/// Decide whether `actor` should receive a badge for `reward_kind`.
///
/// `reward_kind` is a catalog check name: "first_game", "first_game_created"
/// or "wins". Returns the catalog entry to mint, or None when nothing is due.
pub async fn decide(
    pool: &PgPool,
    actor: &str,
    reward_kind: &str,
) -> Result<Option<&'static RewardEntry>> {
    let Some(player_id) = bcr_db::find_player_id_by_address(pool, actor).await? else {
        tracing::debug!(actor, "eligibility: unknown player address");
        return Ok(None);
    };

    match reward_kind {
        "first_game" => {
            // Present in the view = has not played yet; the badge is granted
            // for the game that triggered this request.
            let eligible = bcr_db::in_no_first_game_view(pool, player_id).await?
                && !bcr_db::reward_exists(pool, player_id, "first_game").await?;
            Ok(eligible.then(|| entry_for_badge("first_game").expect("catalog entry")))
        }
        "first_game_created" => {
            let eligible = bcr_db::in_no_first_game_created_view(pool, player_id).await?
                && !bcr_db::reward_exists(pool, player_id, "first_game_created").await?;
            Ok(eligible.then(|| entry_for_badge("first_game_created").expect("catalog entry")))
        }
        "wins" => {
            let victories = bcr_db::victories_total(pool, player_id).await?;
            let granted = bcr_db::granted_badge_types(pool, player_id).await?;

            // First unearned tier in catalog order; only minted once the win
            // count reaches its threshold.
            let next = catalog()
                .iter()
                .filter(|e| e.check == RewardCheck::Wins)
                .find(|e| !granted.iter().any(|g| g == e.badge_type));

            match next {
                Some(entry) if victories >= entry.threshold => Ok(Some(entry)),
                _ => Ok(None),
            }
        }
        other => {
            tracing::warn!(reward_kind = other, "eligibility: unknown reward kind");
            Ok(None)
        }
    }
}
