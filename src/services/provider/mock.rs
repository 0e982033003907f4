#![allow(dead_code)]
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{
    CreatedPreapproval, PaymentInfo, PaymentProvider, PreapprovalRequest, PreapprovalState,
    ProviderError,
};
use crate::models::subscription::SubscriptionStatus;

/// In-memory provider. Preapprovals it creates start out `pending`; tests move
/// them along with [`MockPaymentProvider::set_preapproval_status`].
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    pub preapprovals: Arc<Mutex<HashMap<String, SubscriptionStatus>>>,
    pub payments: Arc<Mutex<HashMap<String, PaymentInfo>>>,
    pub created_requests: Arc<Mutex<Vec<PreapprovalRequest>>>,
    pub cancelled: Arc<Mutex<Vec<String>>>,
    pub unavailable: Arc<AtomicBool>,
    pub get_preapproval_calls: Arc<AtomicUsize>,
    pub get_payment_calls: Arc<AtomicUsize>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_preapproval_status(&self, provider_subscription_id: &str, status: SubscriptionStatus) {
        self.preapprovals
            .lock()
            .unwrap()
            .insert(provider_subscription_id.to_string(), status);
    }

    pub fn insert_payment(&self, payment: PaymentInfo) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.provider_payment_id.clone(), payment);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created_requests.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout);
        }
        Ok(())
    }
}

fn make_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_preapproval(
        &self,
        req: &PreapprovalRequest,
    ) -> Result<CreatedPreapproval, ProviderError> {
        self.check_available()?;
        self.created_requests.lock().unwrap().push(req.clone());

        let id = make_id("prov");
        self.set_preapproval_status(&id, SubscriptionStatus::Pending);
        Ok(CreatedPreapproval {
            checkout_url: format!("https://checkout.example.test/{}", id),
            provider_subscription_id: id,
        })
    }

    async fn get_preapproval(
        &self,
        provider_subscription_id: &str,
    ) -> Result<PreapprovalState, ProviderError> {
        self.get_preapproval_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let status = self
            .preapprovals
            .lock()
            .unwrap()
            .get(provider_subscription_id)
            .copied()
            .ok_or_else(|| {
                ProviderError::NotFound(format!("preapproval {}", provider_subscription_id))
            })?;
        Ok(PreapprovalState {
            provider_subscription_id: provider_subscription_id.to_string(),
            status,
        })
    }

    async fn cancel_preapproval(
        &self,
        provider_subscription_id: &str,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut preapprovals = self.preapprovals.lock().unwrap();
        let Some(status) = preapprovals.get_mut(provider_subscription_id) else {
            return Err(ProviderError::NotFound(format!(
                "preapproval {}",
                provider_subscription_id
            )));
        };
        *status = SubscriptionStatus::Cancelled;
        self.cancelled
            .lock()
            .unwrap()
            .push(provider_subscription_id.to_string());
        Ok(())
    }

    async fn get_payment(&self, provider_payment_id: &str) -> Result<PaymentInfo, ProviderError> {
        self.get_payment_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.payments
            .lock()
            .unwrap()
            .get(provider_payment_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("payment {}", provider_payment_id)))
    }
}
