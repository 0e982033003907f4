use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{subscription_repository::SubscriptionRepository, SUBSCRIPTION_COLUMNS};
use crate::models::subscription::{NewPendingSubscription, Subscription, SubscriptionStatus};

pub struct PostgresSubscriptionRepository {
    pub pool: PgPool,
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1");
        sqlx::query_as::<_, Subscription>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE provider_subscription_id = $1"
        );
        sqlx::query_as::<_, Subscription>(&sql)
            .bind(provider_subscription_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn upsert_pending(
        &self,
        new: &NewPendingSubscription,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        // The WHERE on the conflict arm keeps an authorized row untouched; RETURNING
        // then yields nothing, which is how the caller learns about the conflict.
        let sql = format!(
            r#"
            INSERT INTO subscriptions (
                id,
                user_id,
                plan_id,
                provider_subscription_id,
                provider_status,
                billing_period,
                amount,
                started_at,
                cancelled_at,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, NULL, $8, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_id = EXCLUDED.plan_id,
                provider_subscription_id = EXCLUDED.provider_subscription_id,
                provider_status = EXCLUDED.provider_status,
                billing_period = EXCLUDED.billing_period,
                amount = EXCLUDED.amount,
                started_at = NULL,
                cancelled_at = NULL,
                updated_at = EXCLUDED.updated_at
            WHERE subscriptions.provider_status <> $9
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Subscription>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(&new.plan_id)
            .bind(&new.provider_subscription_id)
            .bind(SubscriptionStatus::Pending)
            .bind(new.billing_period)
            .bind(new.amount)
            .bind(new.now)
            .bind(SubscriptionStatus::Authorized)
            .fetch_optional(&self.pool)
            .await
    }

    async fn apply_provider_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        // SET expressions read the pre-update row, so `provider_status` below is the old value.
        let sql = format!(
            r#"
            UPDATE subscriptions
            SET started_at = CASE
                    WHEN $4 AND started_at IS NULL THEN $3
                    ELSE started_at
                END,
                cancelled_at = CASE
                    WHEN $5 AND provider_status <> $2 THEN $3
                    ELSE cancelled_at
                END,
                provider_status = $2,
                updated_at = $3
            WHERE provider_subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Subscription>(&sql)
            .bind(provider_subscription_id)
            .bind(status)
            .bind(now)
            .bind(status == SubscriptionStatus::Authorized)
            .bind(status.is_stopped())
            .fetch_optional(&self.pool)
            .await
    }
}
