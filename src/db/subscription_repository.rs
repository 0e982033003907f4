use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::subscription::{NewPendingSubscription, Subscription, SubscriptionStatus};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error>;

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Inserts the user's row, or overwrites it when its status is anything
    /// other than `authorized`. Returns `None` when an authorized row blocked the write.
    async fn upsert_pending(
        &self,
        new: &NewPendingSubscription,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    /// Returns `None` when no row carries this provider id.
    async fn apply_provider_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error>;
}
