use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{parse_field, required_field, Id, ItemStatus, RoomId, StoreResult, UserId};

pub type PlaylistItemId = Id<PlaylistItem>;

/// Metadata of a track, as supplied by the track metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub source_id: String,
    pub source_uri: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub image_url: Option<String>,
}

/// One entry in a room's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: PlaylistItemId,
    pub room_id: RoomId,
    #[serde(flatten)]
    pub track: Track,
    pub added_by: UserId,
    pub added_at_ms: i64,
    pub sequence_number: u64,
    pub status: ItemStatus,
}

impl PlaylistItem {
    pub const STATUS_FIELD: &'static str = "status";

    /// Returns the hash fields this item is stored as.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("id", self.id.to_string()),
            ("room_id", self.room_id.to_string()),
            ("source_id", self.track.source_id.clone()),
            ("source_uri", self.track.source_uri.clone()),
            ("name", self.track.name.clone()),
            ("artist", self.track.artist.clone()),
            ("album", self.track.album.clone()),
            ("duration_ms", self.track.duration_ms.to_string()),
            ("added_by_id", self.added_by.to_string()),
            ("added_at_ms", self.added_at_ms.to_string()),
            ("sequence_number", self.sequence_number.to_string()),
            (Self::STATUS_FIELD, self.status.to_string()),
        ];

        if let Some(image_url) = &self.track.image_url {
            fields.push(("album_image_url", image_url.clone()));
        }

        fields
    }

    /// Reads an item back from its stored hash fields.
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Self> {
        let text = |name| required_field(key, fields, name).map(str::to_string);

        let track = Track {
            source_id: text("source_id")?,
            source_uri: text("source_uri")?,
            name: text("name")?,
            artist: text("artist")?,
            album: text("album")?,
            duration_ms: parse_field(key, fields, "duration_ms")?,
            image_url: fields.get("album_image_url").cloned(),
        };

        Ok(Self {
            id: parse_field(key, fields, "id")?,
            room_id: parse_field(key, fields, "room_id")?,
            track,
            added_by: parse_field(key, fields, "added_by_id")?,
            added_at_ms: parse_field(key, fields, "added_at_ms")?,
            sequence_number: parse_field(key, fields, "sequence_number")?,
            status: parse_field(key, fields, Self::STATUS_FIELD)?,
        })
    }
}
