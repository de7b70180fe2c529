use std::{fmt::Display, str::FromStr};

use serde::Serialize;

use partywave_core::{PlaylistItemId, Track, UserId};

/// The role of a member within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Dj,
    Moderator,
    Participant,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "OWNER",
            MemberRole::Dj => "DJ",
            MemberRole::Moderator => "MODERATOR",
            MemberRole::Participant => "PARTICIPANT",
        }
    }

    /// Whether the member may skip a track without a vote.
    pub fn can_skip(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Moderator)
    }
}

impl Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(MemberRole::Owner),
            "DJ" => Ok(MemberRole::Dj),
            "MODERATOR" => Ok(MemberRole::Moderator),
            "PARTICIPANT" => Ok(MemberRole::Participant),
            other => Err(format!("Unknown member role {other:?}")),
        }
    }
}

/// What a vote is cast against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum VoteTarget {
    /// Skip a specific playlist item
    SkipTrack(PlaylistItemId),
    /// Kick a specific member
    KickUser(UserId),
}

impl VoteTarget {
    /// The vote type as stored in the ledger
    pub fn kind(&self) -> &'static str {
        match self {
            VoteTarget::SkipTrack(_) => "SKIPTRACK",
            VoteTarget::KickUser(_) => "KICKUSER",
        }
    }
}

/// Metadata of a track from a search provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub source_uri: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub image_url: Option<String>,
}

impl TrackMetadata {
    pub fn into_track(self, source_id: &str) -> Track {
        Track {
            source_id: source_id.to_string(),
            source_uri: self.source_uri,
            name: self.name,
            artist: self.artist,
            album: self.album,
            duration_ms: self.duration_ms,
            image_url: self.image_url,
        }
    }
}

/// How the tracks a user added were received, summed over every room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackTotals {
    pub total_like: i64,
    pub total_dislike: i64,
}
