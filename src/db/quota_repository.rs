use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::user::User;

/// One calendar day in the provider's reference timezone, as a half-open
/// `[starts_at, ends_at)` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub today: Date,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
}

impl QuotaWindow {
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        instant >= self.starts_at && instant < self.ends_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadConsumption {
    Consumed { quota_used: i32 },
    AlreadyDownloadedToday { quota_used: i32 },
    Exhausted { quota_used: i32, quota_total: i32 },
    UserMissing,
    ResourceMissing,
}

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn find_quota_account(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    /// Consumes one unit of the user's daily allowance in a single atomic step:
    /// rolls a stale window over, re-checks same-day amnesty while holding the
    /// user's row, increments `quota_used` only while it stays below
    /// `quota_total`, appends the download record and bumps the resource counter.
    /// Nothing is persisted unless the outcome is `Consumed`.
    async fn try_consume_download(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        window: &QuotaWindow,
        now: OffsetDateTime,
    ) -> Result<DownloadConsumption, sqlx::Error>;

    /// Drops a user whose paid access has lapsed back to `plan` / `daily_quota`.
    /// Returns the updated user, or `None` when nothing needed reverting.
    async fn revert_lapsed_plan(
        &self,
        user_id: Uuid,
        plan: &str,
        daily_quota: i32,
        now: OffsetDateTime,
    ) -> Result<Option<User>, sqlx::Error>;
}
