use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, PgPool};
use uuid::Uuid;

use partywave_core::{RoomId, UserId};

use crate::{
    DatabaseError, FeedbackTotals, IntoDatabaseError, MemberRole, MembershipAuthority, Result,
    UserStats, VoteLedger, VoteTarget,
};

/// A postgres implementation of the membership authority, the vote ledger, and user totals
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Creates the tables this implementation needs, if they don't exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    /// Adds a member to a room, or reactivates them with a new role.
    pub async fn add_member(&self, room_id: RoomId, user_id: UserId, role: MemberRole) -> Result<()> {
        query(
            "INSERT INTO room_member (room_id, user_id, role) VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id)
            DO UPDATE SET role = $3, is_active = TRUE, last_active_at = now()",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }
}

/// Splits a target into the nullable columns of the vote table
fn target_columns(target: VoteTarget) -> (Option<Uuid>, Option<Uuid>) {
    match target {
        VoteTarget::SkipTrack(item_id) => (Some(item_id.value()), None),
        VoteTarget::KickUser(user_id) => (None, Some(user_id.value())),
    }
}

#[async_trait]
impl MembershipAuthority for PgDatabase {
    async fn member_role(&self, room_id: RoomId, user_id: UserId) -> Result<Option<MemberRole>> {
        let role: Option<String> = query_scalar(
            "SELECT role FROM room_member WHERE room_id = $1 AND user_id = $2 AND is_active",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        role.map(|role| role.parse().map_err(|e: String| DatabaseError::Internal(e.into())))
            .transpose()
    }

    async fn deactivate_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        let result = query(
            "UPDATE room_member SET is_active = FALSE, last_active_at = now()
            WHERE room_id = $1 AND user_id = $2 AND is_active",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VoteLedger for PgDatabase {
    async fn record_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<()> {
        let (item_id, target_user_id) = target_columns(target);

        let result = query(
            "INSERT INTO vote (id, room_id, voter_id, vote_type, playlist_item_id, target_user_id)
            VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(room_id.value())
        .bind(voter_id.value())
        .bind(target.kind())
        .bind(item_id)
        .bind(target_user_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(SqlxError::Database(e)) if e.is_unique_violation() => Err(DatabaseError::Conflict {
                resource: "vote",
                field: "voter_id",
                value: voter_id.to_string(),
            }),
            Err(e) => Err(e.any()),
        }
    }

    async fn count(&self, room_id: RoomId, target: VoteTarget) -> Result<u64> {
        let (item_id, target_user_id) = target_columns(target);

        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM vote
            WHERE room_id = $1 AND vote_type = $2
                AND playlist_item_id IS NOT DISTINCT FROM $3
                AND target_user_id IS NOT DISTINCT FROM $4",
        )
        .bind(room_id.value())
        .bind(target.kind())
        .bind(item_id)
        .bind(target_user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(count as u64)
    }

    async fn has_voted(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<bool> {
        let (item_id, target_user_id) = target_columns(target);

        query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM vote
                WHERE room_id = $1 AND voter_id = $2 AND vote_type = $3
                    AND playlist_item_id IS NOT DISTINCT FROM $4
                    AND target_user_id IS NOT DISTINCT FROM $5
            )",
        )
        .bind(room_id.value())
        .bind(voter_id.value())
        .bind(target.kind())
        .bind(item_id)
        .bind(target_user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn withdraw_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<bool> {
        let (item_id, target_user_id) = target_columns(target);

        let result = query(
            "DELETE FROM vote
            WHERE room_id = $1 AND voter_id = $2 AND vote_type = $3
                AND playlist_item_id IS NOT DISTINCT FROM $4
                AND target_user_id IS NOT DISTINCT FROM $5",
        )
        .bind(room_id.value())
        .bind(voter_id.value())
        .bind(target.kind())
        .bind(item_id)
        .bind(target_user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_votes(&self, room_id: RoomId, target: VoteTarget) -> Result<u64> {
        let (item_id, target_user_id) = target_columns(target);

        let result = query(
            "DELETE FROM vote
            WHERE room_id = $1 AND vote_type = $2
                AND playlist_item_id IS NOT DISTINCT FROM $3
                AND target_user_id IS NOT DISTINCT FROM $4",
        )
        .bind(room_id.value())
        .bind(target.kind())
        .bind(item_id)
        .bind(target_user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected())
    }

    async fn kick_tallies(&self, room_id: RoomId) -> Result<Vec<(UserId, u64)>> {
        let rows: Vec<(Uuid, i64)> = query_as(
            "SELECT target_user_id, COUNT(*) FROM vote
            WHERE room_id = $1 AND vote_type = 'KICKUSER'
            GROUP BY target_user_id
            ORDER BY COUNT(*) DESC",
        )
        .bind(room_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|(user_id, count)| (UserId::from_uuid(user_id), count as u64))
            .collect())
    }
}

#[async_trait]
impl UserStats for PgDatabase {
    async fn adjust_feedback(&self, user_id: UserId, likes: i64, dislikes: i64) -> Result<()> {
        query(
            "INSERT INTO app_user_stats (user_id, total_like, total_dislike) VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET
                total_like = app_user_stats.total_like + $2,
                total_dislike = app_user_stats.total_dislike + $3,
                updated_at = now()",
        )
        .bind(user_id.value())
        .bind(likes)
        .bind(dislikes)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn feedback_totals(&self, user_id: UserId) -> Result<FeedbackTotals> {
        let totals: Option<(i64, i64)> = query_as(
            "SELECT total_like, total_dislike FROM app_user_stats WHERE user_id = $1",
        )
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(totals
            .map(|(total_like, total_dislike)| FeedbackTotals {
                total_like,
                total_dislike,
            })
            .unwrap_or_default())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }
}
