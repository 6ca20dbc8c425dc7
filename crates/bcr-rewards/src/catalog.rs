//! The static badge catalog. Order matters for the tiered "wins" family:
//! lower thresholds come first and are always earned first.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardCheck {
    /// Played at least one game.
    FirstGame,
    /// Created at least one game.
    FirstGameCreated,
    /// Total victories reached the tier threshold.
    Wins,
}

#[derive(Debug, Clone)]
pub struct RewardEntry {
    pub check: RewardCheck,
    pub threshold: i64,
    pub badge_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub source_url: &'static str,
}

const CATALOG: [RewardEntry; 6] = [
    RewardEntry {
        check: RewardCheck::FirstGame,
        threshold: 1,
        badge_type: "first_game",
        name: "First Game",
        description: "Played a first game of blockchess",
        source_url: "https://blockchess.example/badges/first_game.png",
    },
    RewardEntry {
        check: RewardCheck::FirstGameCreated,
        threshold: 1,
        badge_type: "first_game_created",
        name: "Game Creator",
        description: "Created a first game of blockchess",
        source_url: "https://blockchess.example/badges/first_game_created.png",
    },
    RewardEntry {
        check: RewardCheck::Wins,
        threshold: 1,
        badge_type: "wins_1",
        name: "First Victory",
        description: "Won a first game",
        source_url: "https://blockchess.example/badges/wins_1.png",
    },
    RewardEntry {
        check: RewardCheck::Wins,
        threshold: 10,
        badge_type: "wins_10",
        name: "Club Player",
        description: "Won 10 games",
        source_url: "https://blockchess.example/badges/wins_10.png",
    },
    RewardEntry {
        check: RewardCheck::Wins,
        threshold: 50,
        badge_type: "wins_50",
        name: "Master",
        description: "Won 50 games",
        source_url: "https://blockchess.example/badges/wins_50.png",
    },
    RewardEntry {
        check: RewardCheck::Wins,
        threshold: 100,
        badge_type: "wins_100",
        name: "Grandmaster",
        description: "Won 100 games",
        source_url: "https://blockchess.example/badges/wins_100.png",
    },
];

pub fn catalog() -> &'static [RewardEntry] {
    &CATALOG
}

pub fn entry_for_badge(badge_type: &str) -> Option<&'static RewardEntry> {
    CATALOG.iter().find(|e| e.badge_type == badge_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wins_tiers_are_ascending() {
        let tiers: Vec<i64> = catalog()
            .iter()
            .filter(|e| e.check == RewardCheck::Wins)
            .map(|e| e.threshold)
            .collect();
        assert_eq!(tiers, vec![1, 10, 50, 100]);
    }

    #[test]
    fn badge_types_are_unique() {
        for (i, a) in catalog().iter().enumerate() {
            for b in catalog().iter().skip(i + 1) {
                assert_ne!(a.badge_type, b.badge_type);
            }
        }
    }

    #[test]
    fn lookup_by_badge_type() {
        assert_eq!(entry_for_badge("wins_10").unwrap().threshold, 10);
        assert!(entry_for_badge("wins_9000").is_none());
    }
}
