//! Webhook reconciler.
//!
//! A webhook only tells us *which* preapproval or payment changed. Every event
//! triggers a fresh read from the provider and the local state is overwritten
//! with that read, so duplicate, stale and reordered deliveries all converge.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::provider::{ExternalReference, PaymentProvider};
use super::subscriptions::SubscriptionStore;
use super::upgrader::{PaymentOutcome, PlanUpgrader};
use super::EntitlementError;
use crate::models::payment::PAYMENT_STATUS_APPROVED;
use crate::models::subscription::Subscription;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    SubscriptionSynced(Subscription),
    Payment(PaymentOutcome),
    /// Payment exists but is not approved (pending, rejected, refunded...).
    PaymentIgnored { status: String },
}

#[derive(Clone)]
pub struct WebhookReconciler {
    provider: Arc<dyn PaymentProvider>,
    store: SubscriptionStore,
    upgrader: PlanUpgrader,
}

impl WebhookReconciler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: SubscriptionStore,
        upgrader: PlanUpgrader,
    ) -> Self {
        Self {
            provider,
            store,
            upgrader,
        }
    }

    pub async fn handle_subscription_event(
        &self,
        provider_subscription_id: &str,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        self.handle_subscription_event_at(provider_subscription_id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn handle_subscription_event_at(
        &self,
        provider_subscription_id: &str,
        now: OffsetDateTime,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        let Some(local) = self.store.find_by_provider_id(provider_subscription_id).await? else {
            warn!(%provider_subscription_id, "event for a preapproval we never created");
            return Err(EntitlementError::SubscriptionNotFound);
        };

        let current = self.provider.get_preapproval(provider_subscription_id).await?;
        debug!(
            %provider_subscription_id,
            user_id = %local.user_id,
            from = %local.provider_status,
            to = %current.status,
            "applying provider status"
        );
        let row = self
            .store
            .apply_provider_status(provider_subscription_id, current.status, now)
            .await?;

        info!(
            %provider_subscription_id,
            status = %row.provider_status,
            user_id = %row.user_id,
            "subscription reconciled"
        );
        Ok(ReconcileOutcome::SubscriptionSynced(row))
    }

    pub async fn handle_payment_event(
        &self,
        provider_payment_id: &str,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        self.handle_payment_event_at(provider_payment_id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn handle_payment_event_at(
        &self,
        provider_payment_id: &str,
        now: OffsetDateTime,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        let payment = self.provider.get_payment(provider_payment_id).await?;

        if payment.status != PAYMENT_STATUS_APPROVED {
            debug!(%provider_payment_id, status = %payment.status, "ignoring non-approved payment");
            return Ok(ReconcileOutcome::PaymentIgnored {
                status: payment.status,
            });
        }

        let reference = payment
            .external_reference
            .as_deref()
            .and_then(ExternalReference::parse)
            .ok_or_else(|| {
                EntitlementError::InvalidEvent(format!(
                    "payment {} has no usable external_reference",
                    provider_payment_id
                ))
            })?;
        let user_id = reference.user_id;

        let plan_id = match payment.purchased_plan_id.or(reference.plan_id) {
            Some(plan_id) => plan_id,
            None => self
                .store
                .subscription_for_user(user_id)
                .await?
                .map(|s| s.plan_id)
                .ok_or_else(|| {
                    EntitlementError::InvalidEvent(format!(
                        "payment {} does not name a plan",
                        provider_payment_id
                    ))
                })?,
        };

        let outcome = self
            .upgrader
            .handle_payment_approved_at(provider_payment_id, user_id, &plan_id, payment.amount, now)
            .await?;
        Ok(ReconcileOutcome::Payment(outcome))
    }

    /// Processes a subscription event in the background. Failures are logged and dropped.
    pub fn dispatch_subscription_event(&self, provider_subscription_id: String) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            if let Err(err) = reconciler
                .handle_subscription_event(&provider_subscription_id)
                .await
            {
                log_dropped("subscription", &provider_subscription_id, &err);
            }
        })
    }

    /// Processes a payment event in the background. Failures are logged and dropped.
    pub fn dispatch_payment_event(&self, provider_payment_id: String) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            if let Err(err) = reconciler.handle_payment_event(&provider_payment_id).await {
                log_dropped("payment", &provider_payment_id, &err);
            }
        })
    }
}

fn log_dropped(kind: &str, id: &str, err: &EntitlementError) {
    match err {
        EntitlementError::ExternalProviderUnavailable(_) | EntitlementError::Database(_) => {
            error!(?err, kind, id, "webhook processing failed; event dropped")
        }
        _ => warn!(?err, kind, id, "webhook event could not be applied; event dropped"),
    }
}
