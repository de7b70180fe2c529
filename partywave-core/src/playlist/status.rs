use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The lifecycle status of a playlist item.
///
/// Items only move forward: `Queued -> Playing -> Played | Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Queued,
    Playing,
    Played,
    Skipped,
}

#[derive(Debug, Error)]
#[error("Unknown item status {0:?}")]
pub struct UnknownStatus(pub String);

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "QUEUED",
            ItemStatus::Playing => "PLAYING",
            ItemStatus::Played => "PLAYED",
            ItemStatus::Skipped => "SKIPPED",
        }
    }

    /// Returns true if an item may move from this status to `next`.
    pub fn allowed(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Queued, ItemStatus::Playing)
                | (ItemStatus::Playing, ItemStatus::Played)
                | (ItemStatus::Playing, ItemStatus::Skipped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Played | ItemStatus::Skipped)
    }
}

impl Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(ItemStatus::Queued),
            "PLAYING" => Ok(ItemStatus::Playing),
            "PLAYED" => Ok(ItemStatus::Played),
            "SKIPPED" => Ok(ItemStatus::Skipped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ItemStatus; 4] = [
        ItemStatus::Queued,
        ItemStatus::Playing,
        ItemStatus::Played,
        ItemStatus::Skipped,
    ];

    #[test]
    fn test_transition_table() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|current| ALL.iter().map(move |next| (*current, *next)))
            .filter(|(current, next)| current.allowed(*next))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (ItemStatus::Queued, ItemStatus::Playing),
                (ItemStatus::Playing, ItemStatus::Played),
                (ItemStatus::Playing, ItemStatus::Skipped),
            ]
        );
    }

    #[test]
    fn test_terminal_statuses_go_nowhere() {
        for status in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|next| !status.allowed(*next)));
        }
    }

    #[test]
    fn test_parses_stored_form() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<ItemStatus>().expect("parses"), status);
        }

        assert!("paused".parse::<ItemStatus>().is_err());
    }
}
