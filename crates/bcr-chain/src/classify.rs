//! Chain error classification.
//!
//! All retry and suppression decisions key off [`classify`]; worker code
//! never matches on error strings directly.

use bcr_schemas::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Shared-object version race. Transient, backed off, never shown to the
    /// user.
    VersionMismatch,
    /// The badge was already minted or is being minted elsewhere. Dropped
    /// silently for MintBadge.
    DuplicateReward,
    /// MintBadge MoveAbort code 1: the sponsor is not the registry's
    /// authorized minter. Fatal until an operator rotates the minter.
    Authorization,
    /// Anything else: retried and surfaced after the cap.
    Transient,
}

const VERSION_MISMATCH_MARKERS: [&str; 3] = [
    "is not available for consumption",
    "current version",
    "non-retriable",
];

const DUPLICATE_MARKERS: [&str; 4] =
    ["already exists", "already minted", "duplicate", "already locked"];

pub fn classify(kind: IntentKind, message: &str) -> ErrorClass {
    let msg = message.to_ascii_lowercase();

    if VERSION_MISMATCH_MARKERS.iter().any(|m| msg.contains(m)) {
        return ErrorClass::VersionMismatch;
    }

    if kind == IntentKind::MintBadge {
        if DUPLICATE_MARKERS.iter().any(|m| msg.contains(m)) {
            return ErrorClass::DuplicateReward;
        }
        // MoveAbort(..., 1): badge module abort code 1 = unauthorized minter.
        if message.contains("MoveAbort") && message.contains(", 1)") {
            return ErrorClass::Authorization;
        }
    }

    ErrorClass::Transient
}

/// Should this failure be hidden from the user (no `result{error}` event)?
pub fn is_suppressed(kind: IntentKind, class: ErrorClass) -> bool {
    match class {
        ErrorClass::VersionMismatch => true,
        ErrorClass::DuplicateReward => kind == IntentKind::MintBadge,
        _ => false,
    }
}

/// Retry backoff base in milliseconds. Version-mismatch races on the shared
/// badge registry clear quickly, so MintBadge retries sooner.
pub fn backoff_base_ms(kind: IntentKind, class: ErrorClass, default_ms: u64) -> u64 {
    if class == ErrorClass::VersionMismatch && kind == IntentKind::MintBadge {
        2000
    } else {
        default_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_recognizers() {
        for msg in [
            "Object 0xreg is not available for consumption",
            "expected current version 7, got 5",
            "this failure is non-retriable",
        ] {
            assert_eq!(
                classify(IntentKind::CreateGame, msg),
                ErrorClass::VersionMismatch
            );
        }
    }

    #[test]
    fn duplicate_markers_apply_to_mint_badge_only() {
        assert_eq!(
            classify(IntentKind::MintBadge, "badge already minted for player"),
            ErrorClass::DuplicateReward
        );
        assert_eq!(
            classify(IntentKind::MintBadge, "row already locked by peer"),
            ErrorClass::DuplicateReward
        );
        // The same text on another kind is just transient noise.
        assert_eq!(
            classify(IntentKind::MakeMove, "badge already minted for player"),
            ErrorClass::Transient
        );
    }

    #[test]
    fn move_abort_code_one_is_authorization() {
        let msg = "MoveAbort(MoveLocation { module: badge, function_name: Some(\"mint_badge\") }, 1) in command 0";
        assert_eq!(classify(IntentKind::MintBadge, msg), ErrorClass::Authorization);
        // Other abort codes stay transient.
        let other = "MoveAbort(MoveLocation { module: badge }, 2) in command 0";
        assert_eq!(classify(IntentKind::MintBadge, other), ErrorClass::Transient);
    }

    #[test]
    fn suppression_policy() {
        assert!(is_suppressed(
            IntentKind::EndGame,
            ErrorClass::VersionMismatch
        ));
        assert!(is_suppressed(
            IntentKind::MintBadge,
            ErrorClass::DuplicateReward
        ));
        assert!(!is_suppressed(IntentKind::MintBadge, ErrorClass::Transient));
        assert!(!is_suppressed(
            IntentKind::MintBadge,
            ErrorClass::Authorization
        ));
    }

    #[test]
    fn mint_badge_version_mismatch_backs_off_faster() {
        assert_eq!(
            backoff_base_ms(IntentKind::MintBadge, ErrorClass::VersionMismatch, 5000),
            2000
        );
        assert_eq!(
            backoff_base_ms(IntentKind::CreateGame, ErrorClass::VersionMismatch, 5000),
            5000
        );
        assert_eq!(
            backoff_base_ms(IntentKind::MintBadge, ErrorClass::Transient, 5000),
            5000
        );
    }
}
