use crate::{PlaylistItemId, RoomId};

/// Builds the runtime store keys of a room. All of a room's keys share the
/// `{prefix}room:{room_id}` namespace.
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn room(&self, room_id: RoomId) -> String {
        format!("{}room:{}", self.prefix, room_id)
    }

    /// Ordered list of playlist item ids, append-only
    pub fn playlist(&self, room_id: RoomId) -> String {
        format!("{}:playlist", self.room(room_id))
    }

    /// Hash holding the fields of a playlist item
    pub fn playlist_item(&self, room_id: RoomId, item_id: PlaylistItemId) -> String {
        format!("{}:playlist:item:{}", self.room(room_id), item_id)
    }

    pub fn sequence_counter(&self, room_id: RoomId) -> String {
        format!("{}:playlist:sequence_counter", self.room(room_id))
    }

    pub fn playback(&self, room_id: RoomId) -> String {
        format!("{}:playback", self.room(room_id))
    }

    pub fn online_members(&self, room_id: RoomId) -> String {
        format!("{}:members:online", self.room(room_id))
    }

    pub fn likes(&self, room_id: RoomId, item_id: PlaylistItemId) -> String {
        format!("{}:likes", self.playlist_item(room_id, item_id))
    }

    pub fn dislikes(&self, room_id: RoomId, item_id: PlaylistItemId) -> String {
        format!("{}:dislikes", self.playlist_item(room_id, item_id))
    }
}
