//! Subscription state store: the local, one-row-per-user mirror of the
//! provider's preapproval, plus the create/cancel flows that drive it.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::provider::{PaymentProvider, PreapprovalRequest};
use super::EntitlementError;
use crate::db::subscription_repository::SubscriptionRepository;
use crate::db::user_repository::UserRepository;
use crate::models::plan::BillingPeriod;
use crate::models::subscription::{NewPendingSubscription, Subscription, SubscriptionStatus};
use crate::utils::plan_catalog::recurring_offer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub provider_subscription_id: String,
    pub checkout_url: String,
}

#[derive(Clone)]
pub struct SubscriptionStore {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserRepository>,
    provider: Arc<dyn PaymentProvider>,
    back_url: String,
}

impl SubscriptionStore {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserRepository>,
        provider: Arc<dyn PaymentProvider>,
        back_url: impl Into<String>,
    ) -> Self {
        Self {
            subscriptions,
            users,
            provider,
            back_url: back_url.into(),
        }
    }

    /// The user's row, but only while the provider reports it authorized.
    pub async fn get_active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, EntitlementError> {
        let row = self.subscriptions.find_by_user_id(user_id).await?;
        Ok(row.filter(|s| s.provider_status == SubscriptionStatus::Authorized))
    }

    /// The user's row in any provider status.
    pub async fn subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, EntitlementError> {
        Ok(self.subscriptions.find_by_user_id(user_id).await?)
    }

    pub async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, EntitlementError> {
        Ok(self
            .subscriptions
            .find_by_provider_id(provider_subscription_id)
            .await?)
    }

    pub async fn upsert_pending(
        &self,
        user_id: Uuid,
        plan_id: &str,
        provider_subscription_id: &str,
        billing_period: BillingPeriod,
        amount: Decimal,
    ) -> Result<Subscription, EntitlementError> {
        self.upsert_pending_at(
            user_id,
            plan_id,
            provider_subscription_id,
            billing_period,
            amount,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn upsert_pending_at(
        &self,
        user_id: Uuid,
        plan_id: &str,
        provider_subscription_id: &str,
        billing_period: BillingPeriod,
        amount: Decimal,
        now: OffsetDateTime,
    ) -> Result<Subscription, EntitlementError> {
        let new = NewPendingSubscription {
            user_id,
            plan_id: plan_id.to_string(),
            provider_subscription_id: provider_subscription_id.to_string(),
            billing_period,
            amount,
            now,
        };
        self.subscriptions
            .upsert_pending(&new)
            .await?
            .ok_or(EntitlementError::AlreadySubscribed)
    }

    /// Writes whatever the provider last reported. Re-applying a status only
    /// bumps `updated_at`.
    pub async fn apply_provider_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        now: OffsetDateTime,
    ) -> Result<Subscription, EntitlementError> {
        self.subscriptions
            .apply_provider_status(provider_subscription_id, status, now)
            .await?
            .ok_or(EntitlementError::SubscriptionNotFound)
    }

    pub async fn cancel_by_user(&self, user_id: Uuid) -> Result<Subscription, EntitlementError> {
        self.cancel_by_user_at(user_id, OffsetDateTime::now_utc()).await
    }

    /// Stops future renewals. Paid access already bought stays until
    /// `subscription_expiry`.
    pub async fn cancel_by_user_at(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Subscription, EntitlementError> {
        let active = self
            .get_active_subscription(user_id)
            .await?
            .ok_or(EntitlementError::SubscriptionNotFound)?;

        self.provider
            .cancel_preapproval(&active.provider_subscription_id)
            .await?;

        let cancelled = self
            .apply_provider_status(
                &active.provider_subscription_id,
                SubscriptionStatus::Cancelled,
                now,
            )
            .await?;

        if !self.users.set_auto_renew(user_id, false).await? {
            warn!(%user_id, "cancelled subscription for a user that no longer exists");
        }

        info!(
            %user_id,
            provider_subscription_id = %cancelled.provider_subscription_id,
            "subscription cancelled by user"
        );
        Ok(cancelled)
    }

    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        plan_id: &str,
        billing_period: Option<BillingPeriod>,
    ) -> Result<CheckoutStarted, EntitlementError> {
        self.create_subscription_at(user_id, plan_id, billing_period, OffsetDateTime::now_utc())
            .await
    }

    /// Starts a provider checkout. The authorized-row check happens before the
    /// provider is contacted; the guarded upsert catches a racing request.
    pub async fn create_subscription_at(
        &self,
        user_id: Uuid,
        plan_id: &str,
        billing_period: Option<BillingPeriod>,
        now: OffsetDateTime,
    ) -> Result<CheckoutStarted, EntitlementError> {
        let period = billing_period.unwrap_or(BillingPeriod::Monthly);
        let offer = recurring_offer(plan_id, period)
            .ok_or_else(|| EntitlementError::UnknownPlan(plan_id.to_string()))?;
        let frequency_months = offer
            .billing_period
            .frequency_months()
            .ok_or_else(|| EntitlementError::UnknownPlan(plan_id.to_string()))?;

        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(EntitlementError::UserNotFound)?;

        if self.get_active_subscription(user_id).await?.is_some() {
            return Err(EntitlementError::AlreadySubscribed);
        }

        let created = self
            .provider
            .create_preapproval(&PreapprovalRequest {
                reason: format!("{} ({})", offer.tier, offer.billing_period.as_str()),
                payer_email: user.email.clone(),
                back_url: self.back_url.clone(),
                user_id,
                plan_id: offer.id.to_string(),
                amount: offer.price,
                frequency_months,
            })
            .await?;

        let stored = self
            .upsert_pending_at(
                user_id,
                offer.id,
                &created.provider_subscription_id,
                offer.billing_period,
                offer.price,
                now,
            )
            .await;

        if let Err(EntitlementError::AlreadySubscribed) = stored {
            // lost a race with another checkout; the preapproval we just made is orphaned
            if let Err(err) = self
                .provider
                .cancel_preapproval(&created.provider_subscription_id)
                .await
            {
                error!(
                    ?err,
                    %user_id,
                    provider_subscription_id = %created.provider_subscription_id,
                    "failed to cancel orphaned preapproval"
                );
            }
        }
        stored?;

        info!(
            %user_id,
            plan_id = offer.id,
            provider_subscription_id = %created.provider_subscription_id,
            "subscription checkout started"
        );
        Ok(CheckoutStarted {
            provider_subscription_id: created.provider_subscription_id,
            checkout_url: created.checkout_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::{test_user, MockDb};
    use crate::services::provider::MockPaymentProvider;
    use time::macros::{date, datetime};
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2024-05-10 15:00 UTC);

    fn store(db: Arc<MockDb>, provider: MockPaymentProvider) -> SubscriptionStore {
        SubscriptionStore::new(
            db.clone(),
            db,
            Arc::new(provider),
            "https://shop.example/subscription/return",
        )
    }

    #[tokio::test]
    async fn pending_then_authorized_blocks_new_pending() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let store = store(db.clone(), MockPaymentProvider::new());
        let amount = Decimal::new(4990, 2);

        let row = store
            .upsert_pending_at(user_id, "ministry", "prov-123", BillingPeriod::Monthly, amount, NOW)
            .await
            .unwrap();
        assert_eq!(row.provider_status, SubscriptionStatus::Pending);
        assert!(row.started_at.is_none());

        let t = NOW + Duration::minutes(5);
        let authorized = store
            .apply_provider_status("prov-123", SubscriptionStatus::Authorized, t)
            .await
            .unwrap();
        assert_eq!(authorized.provider_status, SubscriptionStatus::Authorized);
        assert_eq!(authorized.started_at, Some(t));

        let again = store
            .upsert_pending_at(user_id, "ministry", "prov-123", BillingPeriod::Monthly, amount, t)
            .await;
        assert!(matches!(again, Err(EntitlementError::AlreadySubscribed)));
        assert_eq!(
            db.subscription_for(user_id).unwrap().provider_status,
            SubscriptionStatus::Authorized
        );
    }

    #[tokio::test]
    async fn applying_the_same_status_twice_is_idempotent() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let store = store(db.clone(), MockPaymentProvider::new());
        store
            .upsert_pending_at(user_id, "premium", "prov-9", BillingPeriod::Annual, Decimal::new(29999, 2), NOW)
            .await
            .unwrap();

        let first = store
            .apply_provider_status("prov-9", SubscriptionStatus::Cancelled, NOW + Duration::hours(1))
            .await
            .unwrap();
        let second = store
            .apply_provider_status("prov-9", SubscriptionStatus::Cancelled, NOW + Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(first.provider_status, second.provider_status);
        assert_eq!(first.cancelled_at, second.cancelled_at);
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(second.updated_at, NOW + Duration::hours(2));
    }

    #[tokio::test]
    async fn overwriting_a_cancelled_row_resets_lifecycle_fields() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let store = store(db.clone(), MockPaymentProvider::new());
        let amount = Decimal::new(2990, 2);

        store
            .upsert_pending_at(user_id, "premium_monthly", "prov-old", BillingPeriod::Monthly, amount, NOW)
            .await
            .unwrap();
        store
            .apply_provider_status("prov-old", SubscriptionStatus::Authorized, NOW)
            .await
            .unwrap();
        store
            .apply_provider_status("prov-old", SubscriptionStatus::Rejected, NOW + Duration::days(1))
            .await
            .unwrap();

        let fresh = store
            .upsert_pending_at(
                user_id,
                "ministry_monthly",
                "prov-new",
                BillingPeriod::Monthly,
                Decimal::new(4990, 2),
                NOW + Duration::days(2),
            )
            .await
            .unwrap();
        assert_eq!(fresh.provider_subscription_id, "prov-new");
        assert_eq!(fresh.provider_status, SubscriptionStatus::Pending);
        assert!(fresh.cancelled_at.is_none());
        assert!(fresh.started_at.is_none());
    }

    #[tokio::test]
    async fn unknown_provider_id_is_not_found() {
        let store = store(Arc::new(MockDb::new()), MockPaymentProvider::new());
        let result = store
            .apply_provider_status("prov-missing", SubscriptionStatus::Authorized, NOW)
            .await;
        assert!(matches!(result, Err(EntitlementError::SubscriptionNotFound)));
    }

    #[tokio::test]
    async fn cancel_stops_renewal_but_keeps_paid_access() {
        let mut user = test_user(50, date!(2024 - 05 - 10));
        user.plan = "ministry".into();
        user.auto_renew = true;
        user.subscription_expiry = Some(NOW + Duration::days(20));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        let store = store(db.clone(), provider.clone());

        let started = store
            .create_subscription_at(user_id, "ministry", None, NOW)
            .await
            .unwrap();
        provider.set_preapproval_status(&started.provider_subscription_id, SubscriptionStatus::Authorized);
        store
            .apply_provider_status(&started.provider_subscription_id, SubscriptionStatus::Authorized, NOW)
            .await
            .unwrap();

        let cancelled = store
            .cancel_by_user_at(user_id, NOW + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(cancelled.provider_status, SubscriptionStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(NOW + Duration::hours(1)));
        assert_eq!(
            provider.cancelled.lock().unwrap().as_slice(),
            &[started.provider_subscription_id.clone()]
        );

        let stored = db.user(user_id).unwrap();
        assert!(!stored.auto_renew);
        assert_eq!(stored.quota_total, 50);
        assert_eq!(stored.plan, "ministry");
        assert_eq!(stored.subscription_expiry, Some(NOW + Duration::days(20)));
    }

    #[tokio::test]
    async fn cancel_without_authorized_row_is_not_found() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        let store = store(db.clone(), provider.clone());

        store
            .create_subscription_at(user_id, "premium", Some(BillingPeriod::Annual), NOW)
            .await
            .unwrap();

        let result = store.cancel_by_user_at(user_id, NOW).await;
        assert!(matches!(result, Err(EntitlementError::SubscriptionNotFound)));
        assert!(provider.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_sends_plan_terms_to_provider() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        let store = store(db.clone(), provider.clone());

        let started = store
            .create_subscription_at(user_id, "premium", Some(BillingPeriod::Annual), NOW)
            .await
            .unwrap();
        assert!(started.checkout_url.contains(&started.provider_subscription_id));

        let requests = provider.created_requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].plan_id, "premium_annual");
        assert_eq!(requests[0].amount, Decimal::new(29999, 2));
        assert_eq!(requests[0].frequency_months, 12);
        assert_eq!(requests[0].user_id, user_id);
        assert_eq!(requests[0].payer_email, "member@example.com");

        let row = db.subscription_for(user_id).unwrap();
        assert_eq!(row.plan_id, "premium_annual");
        assert_eq!(row.provider_status, SubscriptionStatus::Pending);
        assert_eq!(row.billing_period, BillingPeriod::Annual);
    }

    #[tokio::test]
    async fn create_refuses_before_calling_provider_when_already_authorized() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        let store = store(db.clone(), provider.clone());

        store
            .upsert_pending_at(user_id, "premium_monthly", "prov-1", BillingPeriod::Monthly, Decimal::new(2990, 2), NOW)
            .await
            .unwrap();
        store
            .apply_provider_status("prov-1", SubscriptionStatus::Authorized, NOW)
            .await
            .unwrap();

        let result = store
            .create_subscription_at(user_id, "ministry", None, NOW)
            .await;
        assert!(matches!(result, Err(EntitlementError::AlreadySubscribed)));
        assert_eq!(provider.created_count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_unknown_plans_and_users() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        let store = store(db, provider.clone());

        assert!(matches!(
            store.create_subscription_at(user_id, "gold", None, NOW).await,
            Err(EntitlementError::UnknownPlan(p)) if p == "gold"
        ));
        assert!(matches!(
            store.create_subscription_at(user_id, "free", None, NOW).await,
            Err(EntitlementError::UnknownPlan(_))
        ));
        assert!(matches!(
            store.create_subscription_at(Uuid::new_v4(), "premium", None, NOW).await,
            Err(EntitlementError::UserNotFound)
        ));
        assert_eq!(provider.created_count(), 0);
    }

    #[tokio::test]
    async fn provider_outage_surfaces_and_writes_nothing() {
        let user = test_user(3, date!(2024 - 05 - 10));
        let user_id = user.id;
        let db = Arc::new(MockDb::new().with_user(user));
        let provider = MockPaymentProvider::new();
        provider.set_unavailable(true);
        let store = store(db.clone(), provider);

        let result = store.create_subscription_at(user_id, "premium", None, NOW).await;
        assert!(matches!(
            result,
            Err(EntitlementError::ExternalProviderUnavailable(_))
        ));
        assert!(db.subscription_for(user_id).is_none());
    }
}
