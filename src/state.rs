use crate::config::Config;
use crate::db::{
    payment_repository::PaymentRepository, quota_repository::QuotaRepository,
    subscription_repository::SubscriptionRepository, user_repository::UserRepository,
};
use crate::services::calendar::ProviderCalendar;
use crate::services::provider::PaymentProvider;
use crate::services::quota::QuotaLedger;
use crate::services::reconciler::WebhookReconciler;
use crate::services::subscriptions::SubscriptionStore;
use crate::services::upgrader::PlanUpgrader;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub quota: QuotaLedger,
    pub subscriptions: SubscriptionStore,
    pub reconciler: WebhookReconciler,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the engine components over the given storage and provider handles.
    pub fn new(
        users: Arc<dyn UserRepository>,
        quota: Arc<dyn QuotaRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
        provider: Arc<dyn PaymentProvider>,
        config: Arc<Config>,
    ) -> Self {
        let calendar = ProviderCalendar::new(config.provider.timezone);
        let store = SubscriptionStore::new(
            subscriptions,
            users,
            provider.clone(),
            config.provider.back_url.clone(),
        );
        let reconciler =
            WebhookReconciler::new(provider, store.clone(), PlanUpgrader::new(payments));

        Self {
            quota: QuotaLedger::new(quota, calendar),
            subscriptions: store,
            reconciler,
            config,
        }
    }
}
