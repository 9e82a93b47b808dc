use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{GuildConfig, RequestStatus, RoleRequest};

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserts a new pending request. Returns `DatabaseError::Duplicate` when
    /// the public request id is already taken, so callers can retry with a
    /// fresh id.
    async fn insert_unique(&self, request: &RoleRequest) -> Result<RoleRequest, DatabaseError>;

    async fn get_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<RoleRequest>, DatabaseError>;

    /// Atomically moves a request from PENDING to the given terminal outcome.
    /// Returns the decided row when this call won the transition, or `None`
    /// when the request was missing or already decided.
    async fn claim_pending(
        &self,
        request_id: &str,
        outcome: RequestStatus,
        decided_by: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<Option<RoleRequest>, DatabaseError>;

    /// Records where the review card for a request was posted.
    async fn set_review_location(
        &self,
        request_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DatabaseError>;

    /// Deletes decided requests created before the cutoff.
    /// Pending requests are never deleted. Returns the number of rows removed.
    async fn delete_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;
}

#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    /// Fetches the configuration row for a guild, inserting an empty one on
    /// first access.
    async fn get_or_create(&self, guild_id: &str) -> Result<GuildConfig, DatabaseError>;

    async fn save(&self, config: &GuildConfig) -> Result<GuildConfig, DatabaseError>;
}
