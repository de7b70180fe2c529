use std::collections::HashMap;

use serde::Serialize;

use crate::{parse_field, PlaylistItemId, StoreResult};

/// The "now playing" record of a room. Absent means playback is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub current_item_id: PlaylistItemId,
    pub started_at_ms: i64,
    pub track_duration_ms: u64,
    pub updated_at_ms: i64,
}

impl PlaybackState {
    pub const CURRENT_FIELD: &'static str = "current_playlist_item_id";

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::CURRENT_FIELD, self.current_item_id.to_string()),
            ("started_at_ms", self.started_at_ms.to_string()),
            ("track_duration_ms", self.track_duration_ms.to_string()),
            ("updated_at_ms", self.updated_at_ms.to_string()),
        ]
    }

    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Self> {
        Ok(Self {
            current_item_id: parse_field(key, fields, Self::CURRENT_FIELD)?,
            started_at_ms: parse_field(key, fields, "started_at_ms")?,
            track_duration_ms: parse_field(key, fields, "track_duration_ms")?,
            updated_at_ms: parse_field(key, fields, "updated_at_ms")?,
        })
    }

    /// How far into the track playback is at `now_ms`.
    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms).max(0) as u64
    }

    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        self.track_duration_ms
            .saturating_sub(self.elapsed_ms(now_ms))
    }
}

/// The result of a playback mutation.
///
/// Expected business outcomes such as "nothing playing" are failures here, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    /// The item that is playing after the operation, if any
    pub item_id: Option<PlaylistItemId>,
}

impl OperationResult {
    pub fn succeeded(message: impl Into<String>, item_id: Option<PlaylistItemId>) -> Self {
        Self {
            success: true,
            message: message.into(),
            item_id,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            item_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_never_negative() {
        let state = PlaybackState {
            current_item_id: PlaylistItemId::new(),
            started_at_ms: 10_000,
            track_duration_ms: 5_000,
            updated_at_ms: 10_000,
        };

        assert_eq!(state.elapsed_ms(9_000), 0);
        assert_eq!(state.elapsed_ms(12_500), 2_500);
        assert_eq!(state.remaining_ms(12_500), 2_500);
        assert_eq!(state.remaining_ms(20_000), 0);
    }
}
