use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::payment_repository::{PaymentApplication, PaymentRepository};
use super::quota_repository::{DownloadConsumption, QuotaRepository, QuotaWindow};
use super::subscription_repository::SubscriptionRepository;
use super::user_repository::UserRepository;
use crate::models::download::DownloadRecord;
use crate::models::payment::{NewPaymentRecord, PaymentRecord};
use crate::models::plan::PlanGrant;
use crate::models::subscription::{NewPendingSubscription, Subscription, SubscriptionStatus};
use crate::models::user::{User, UserRole};
use crate::services::calendar::reset_due;
use crate::utils::plan_catalog::FREE_PLAN_ID;

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, User>,
    resources: HashMap<Uuid, i64>,
    downloads: Vec<DownloadRecord>,
    subscriptions: Vec<Subscription>,
    payments: Vec<PaymentRecord>,
}

/// In-memory stand-in for every repository. A single mutex guards all tables,
/// so each trait method is atomic the same way its Postgres transaction is.
#[derive(Default)]
#[allow(dead_code)]
pub struct MockDb {
    state: Mutex<MockState>,
    pub should_fail: bool,
    pub apply_status_calls: Mutex<usize>,
}

/// Free-plan member whose window last rolled over on `last_reset`.
#[allow(dead_code)]
pub fn test_user(quota_total: i32, last_reset: Date) -> User {
    User {
        id: Uuid::new_v4(),
        email: "member@example.com".into(),
        role: UserRole::Member,
        plan: FREE_PLAN_ID.into(),
        quota_used: 0,
        quota_total,
        last_quota_reset_date: last_reset,
        auto_renew: false,
        subscription_expiry: None,
    }
}

#[allow(dead_code)]
impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_user(self, user: User) -> Self {
        self.insert_user(user);
        self
    }

    pub fn with_resource(self, resource_id: Uuid) -> Self {
        self.state.lock().unwrap().resources.insert(resource_id, 0);
        self
    }

    pub fn insert_user(&self, user: User) {
        self.state.lock().unwrap().users.insert(user.id, user);
    }

    pub fn insert_download(&self, record: DownloadRecord) {
        self.state.lock().unwrap().downloads.push(record);
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().unwrap().users.get(&user_id).cloned()
    }

    pub fn downloads_for(&self, user_id: Uuid) -> Vec<DownloadRecord> {
        self.state
            .lock()
            .unwrap()
            .downloads
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn resource_download_count(&self, resource_id: Uuid) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&resource_id)
            .copied()
    }

    pub fn subscription_for(&self, user_id: Uuid) -> Option<Subscription> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned()
    }

    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.state.lock().unwrap().payments.clone()
    }

    fn fail_if_configured(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self.user(user_id))
    }

    async fn set_auto_renew(&self, user_id: Uuid, auto_renew: bool) -> Result<bool, sqlx::Error> {
        self.fail_if_configured()?;
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.auto_renew = auto_renew;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl QuotaRepository for MockDb {
    async fn find_quota_account(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self.user(user_id))
    }

    async fn try_consume_download(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        window: &QuotaWindow,
        now: OffsetDateTime,
    ) -> Result<DownloadConsumption, sqlx::Error> {
        self.fail_if_configured()?;

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let Some(user) = state.users.get(&user_id) else {
            return Ok(DownloadConsumption::UserMissing);
        };
        let quota_total = user.quota_total;
        let quota_used = if reset_due(user.last_quota_reset_date, window.today) {
            0
        } else {
            user.quota_used
        };

        let already = state.downloads.iter().any(|d| {
            d.user_id == user_id && d.resource_id == resource_id && window.contains(d.downloaded_at)
        });
        if already {
            return Ok(DownloadConsumption::AlreadyDownloadedToday { quota_used });
        }

        if quota_used >= quota_total {
            return Ok(DownloadConsumption::Exhausted {
                quota_used,
                quota_total,
            });
        }

        let Some(counter) = state.resources.get_mut(&resource_id) else {
            return Ok(DownloadConsumption::ResourceMissing);
        };
        *counter += 1;

        state.downloads.push(DownloadRecord {
            id: Uuid::new_v4(),
            user_id,
            resource_id,
            downloaded_at: now,
        });

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.quota_used = quota_used + 1;
        user.last_quota_reset_date = window.today;
        Ok(DownloadConsumption::Consumed {
            quota_used: user.quota_used,
        })
    }

    async fn revert_lapsed_plan(
        &self,
        user_id: Uuid,
        plan: &str,
        daily_quota: i32,
        now: OffsetDateTime,
    ) -> Result<Option<User>, sqlx::Error> {
        self.fail_if_configured()?;
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        let lapsed = user.plan != plan && user.subscription_expiry.is_some_and(|exp| exp <= now);
        if !lapsed {
            return Ok(None);
        }
        user.plan = plan.to_string();
        user.quota_total = daily_quota;
        user.quota_used = user.quota_used.min(daily_quota);
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl SubscriptionRepository for MockDb {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self.subscription_for(user_id))
    }

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn upsert_pending(
        &self,
        new: &NewPendingSubscription,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.fail_if_configured()?;
        let mut state = self.state.lock().unwrap();

        // mirrors the unique index on provider_subscription_id
        if state.subscriptions.iter().any(|s| {
            s.provider_subscription_id == new.provider_subscription_id && s.user_id != new.user_id
        }) {
            return Err(sqlx::Error::Protocol(
                "duplicate provider_subscription_id".into(),
            ));
        }

        if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.user_id == new.user_id)
        {
            if existing.provider_status == SubscriptionStatus::Authorized {
                return Ok(None);
            }
            existing.plan_id = new.plan_id.clone();
            existing.provider_subscription_id = new.provider_subscription_id.clone();
            existing.provider_status = SubscriptionStatus::Pending;
            existing.billing_period = new.billing_period;
            existing.amount = new.amount;
            existing.started_at = None;
            existing.cancelled_at = None;
            existing.updated_at = new.now;
            return Ok(Some(existing.clone()));
        }

        let row = Subscription {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            plan_id: new.plan_id.clone(),
            provider_subscription_id: new.provider_subscription_id.clone(),
            provider_status: SubscriptionStatus::Pending,
            billing_period: new.billing_period,
            amount: new.amount,
            started_at: None,
            cancelled_at: None,
            created_at: new.now,
            updated_at: new.now,
        };
        state.subscriptions.push(row.clone());
        Ok(Some(row))
    }

    async fn apply_provider_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.fail_if_configured()?;
        *self.apply_status_calls.lock().unwrap() += 1;
        let mut state = self.state.lock().unwrap();
        let Some(row) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        else {
            return Ok(None);
        };

        if status == SubscriptionStatus::Authorized && row.started_at.is_none() {
            row.started_at = Some(now);
        }
        if status.is_stopped() && row.provider_status != status {
            row.cancelled_at = Some(now);
        }
        row.provider_status = status;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl PaymentRepository for MockDb {
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.provider_payment_id == provider_payment_id)
            .cloned())
    }

    async fn apply_approved_payment(
        &self,
        record: &NewPaymentRecord,
        grant: &PlanGrant,
        subscription_expiry: OffsetDateTime,
    ) -> Result<PaymentApplication, sqlx::Error> {
        self.fail_if_configured()?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state
            .payments
            .iter()
            .any(|p| p.provider_payment_id == record.provider_payment_id)
        {
            return Ok(PaymentApplication::Duplicate);
        }

        let Some(user) = state.users.get_mut(&record.user_id) else {
            return Ok(PaymentApplication::UserMissing);
        };
        user.plan = grant.plan.clone();
        user.quota_total = grant.daily_quota;
        user.quota_used = user.quota_used.min(grant.daily_quota);
        user.subscription_expiry = Some(subscription_expiry);
        user.auto_renew = true;

        let payment = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            provider_payment_id: record.provider_payment_id.clone(),
            status: record.status.clone(),
            plan_id: record.plan_id.clone(),
            amount: record.amount,
            created_at: record.created_at,
        };
        state.payments.push(payment.clone());
        Ok(PaymentApplication::Applied(payment))
    }
}
