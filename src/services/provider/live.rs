use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    CreatedPreapproval, ExternalReference, PaymentInfo, PaymentProvider, PreapprovalRequest, PreapprovalState,
    ProviderError,
};
use crate::config::ProviderSettings;
use crate::models::subscription::SubscriptionStatus;

pub struct LivePaymentProvider {
    client: Client,
    base_url: String,
    access_token: String,
    currency: String,
}

impl LivePaymentProvider {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            currency: currency.into(),
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::new(
            client,
            settings.api_base_url.clone(),
            settings.access_token.clone(),
            settings.currency.clone(),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Serialize)]
struct AutoRecurring<'a> {
    frequency: u32,
    frequency_type: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    currency_id: &'a str,
}

#[derive(Serialize)]
struct CreatePreapprovalBody<'a> {
    reason: &'a str,
    payer_email: &'a str,
    back_url: &'a str,
    external_reference: String,
    status: &'static str,
    auto_recurring: AutoRecurring<'a>,
}

#[derive(Deserialize)]
struct PreapprovalResponse {
    id: String,
    status: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    status: String,
    external_reference: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    transaction_amount: Option<Decimal>,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    additional_info: Value,
}

/// The plan id travels in `metadata.plan_id`; checkout-created payments carry
/// it as the first item id instead.
fn purchased_plan_id(payment: &PaymentResponse) -> Option<String> {
    payment
        .metadata
        .get("plan_id")
        .and_then(|v| v.as_str())
        .or_else(|| {
            payment
                .additional_info
                .get("items")
                .and_then(|items| items.get(0))
                .and_then(|item| item.get("id"))
                .and_then(|v| v.as_str())
        })
        .map(|s| s.to_string())
}

async fn ensure_success(res: Response, what: &str) -> Result<Response, ProviderError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(what.to_string()));
    }
    let body = res.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

fn parse_status(raw: &str) -> Result<SubscriptionStatus, ProviderError> {
    raw.parse::<SubscriptionStatus>()
        .map_err(|_| ProviderError::UnknownStatus(raw.to_string()))
}

#[async_trait]
impl PaymentProvider for LivePaymentProvider {
    async fn create_preapproval(
        &self,
        req: &PreapprovalRequest,
    ) -> Result<CreatedPreapproval, ProviderError> {
        let body = CreatePreapprovalBody {
            reason: &req.reason,
            payer_email: &req.payer_email,
            back_url: &req.back_url,
            external_reference: ExternalReference::new(req.user_id, &req.plan_id).to_string(),
            status: "pending",
            auto_recurring: AutoRecurring {
                frequency: req.frequency_months,
                frequency_type: "months",
                transaction_amount: req.amount,
                currency_id: &self.currency,
            },
        };

        let res = self
            .client
            .post(self.url("/preapproval"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let res = ensure_success(res, "preapproval").await?;
        let created: PreapprovalResponse = res.json().await?;

        let checkout_url = created
            .init_point
            .or(created.sandbox_init_point)
            .ok_or_else(|| ProviderError::Decode("preapproval without init_point".into()))?;

        debug!(provider_subscription_id = %created.id, "created preapproval");
        Ok(CreatedPreapproval {
            provider_subscription_id: created.id,
            checkout_url,
        })
    }

    async fn get_preapproval(
        &self,
        provider_subscription_id: &str,
    ) -> Result<PreapprovalState, ProviderError> {
        let res = self
            .client
            .get(self.url(&format!("/preapproval/{}", provider_subscription_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let res = ensure_success(res, provider_subscription_id).await?;
        let body: PreapprovalResponse = res.json().await?;

        Ok(PreapprovalState {
            provider_subscription_id: body.id,
            status: parse_status(&body.status)?,
        })
    }

    async fn cancel_preapproval(
        &self,
        provider_subscription_id: &str,
    ) -> Result<(), ProviderError> {
        let res = self
            .client
            .put(self.url(&format!("/preapproval/{}", provider_subscription_id)))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "status": "cancelled" }))
            .send()
            .await?;
        ensure_success(res, provider_subscription_id).await?;
        Ok(())
    }

    async fn get_payment(&self, provider_payment_id: &str) -> Result<PaymentInfo, ProviderError> {
        let res = self
            .client
            .get(self.url(&format!("/v1/payments/{}", provider_payment_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let res = ensure_success(res, provider_payment_id).await?;
        let body: PaymentResponse = res.json().await?;

        Ok(PaymentInfo {
            provider_payment_id: provider_payment_id.to_string(),
            purchased_plan_id: purchased_plan_id(&body),
            status: body.status,
            external_reference: body.external_reference,
            amount: body.transaction_amount.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    fn provider(server: &MockServer) -> LivePaymentProvider {
        LivePaymentProvider::new(Client::new(), server.base_url(), "test-token", "BRL")
    }

    #[tokio::test]
    async fn create_preapproval_posts_recurring_terms_and_plan() {
        let user_id = Uuid::parse_str("8d0c2b8e-5b9a-4a54-9d38-2f3b9f0e9c11").unwrap();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/preapproval")
                    .header("authorization", "Bearer test-token")
                    .json_body_partial(
                        json!({
                            "payer_email": "payer@example.com",
                            "external_reference": format!("{user_id}:premium_annual"),
                            "status": "pending",
                            "auto_recurring": {
                                "frequency": 12,
                                "frequency_type": "months",
                                "currency_id": "BRL"
                            }
                        })
                        .to_string(),
                    );
                then.status(201).json_body(json!({
                    "id": "2c938084",
                    "status": "pending",
                    "init_point": "https://checkout.example/2c938084"
                }));
            })
            .await;

        let created = provider(&server)
            .create_preapproval(&PreapprovalRequest {
                reason: "Premium annual".into(),
                payer_email: "payer@example.com".into(),
                back_url: "https://shop.example/return".into(),
                user_id,
                plan_id: "premium_annual".into(),
                amount: Decimal::new(29999, 2),
                frequency_months: 12,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(created.provider_subscription_id, "2c938084");
        assert_eq!(created.checkout_url, "https://checkout.example/2c938084");
    }

    #[tokio::test]
    async fn get_preapproval_maps_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/preapproval/prov-123");
                then.status(200)
                    .json_body(json!({ "id": "prov-123", "status": "authorized" }));
            })
            .await;

        let state = provider(&server).get_preapproval("prov-123").await.unwrap();
        assert_eq!(state.status, SubscriptionStatus::Authorized);
    }

    #[tokio::test]
    async fn get_preapproval_rejects_unknown_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/preapproval/prov-123");
                then.status(200)
                    .json_body(json!({ "id": "prov-123", "status": "finished" }));
            })
            .await;

        let err = provider(&server).get_preapproval("prov-123").await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownStatus(s) if s == "finished"));
    }

    #[tokio::test]
    async fn cancel_preapproval_puts_cancelled_status() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/preapproval/prov-123")
                    .json_body(json!({ "status": "cancelled" }));
                then.status(200)
                    .json_body(json!({ "id": "prov-123", "status": "cancelled" }));
            })
            .await;

        provider(&server).cancel_preapproval("prov-123").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_payment_reads_reference_amount_and_plan() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payments/pay-1");
                then.status(200).json_body(json!({
                    "id": 1234567,
                    "status": "approved",
                    "external_reference": "8d0c2b8e-5b9a-4a54-9d38-2f3b9f0e9c11",
                    "transaction_amount": 299.99,
                    "metadata": { "plan_id": "premium_annual" }
                }));
            })
            .await;

        let payment = provider(&server).get_payment("pay-1").await.unwrap();
        assert_eq!(payment.status, "approved");
        assert_eq!(payment.amount, Decimal::new(29999, 2));
        assert_eq!(payment.purchased_plan_id.as_deref(), Some("premium_annual"));
        assert_eq!(
            payment.external_reference.as_deref(),
            Some("8d0c2b8e-5b9a-4a54-9d38-2f3b9f0e9c11")
        );
    }

    #[tokio::test]
    async fn get_payment_falls_back_to_item_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payments/pay-2");
                then.status(200).json_body(json!({
                    "status": "approved",
                    "transaction_amount": 49.9,
                    "additional_info": { "items": [{ "id": "ministry_monthly" }] }
                }));
            })
            .await;

        let payment = provider(&server).get_payment("pay-2").await.unwrap();
        assert_eq!(payment.purchased_plan_id.as_deref(), Some("ministry_monthly"));
        assert!(payment.external_reference.is_none());
    }

    #[tokio::test]
    async fn error_statuses_are_mapped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payments/missing");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payments/broken");
                then.status(503).body("maintenance");
            })
            .await;

        let p = provider(&server);
        assert!(matches!(
            p.get_payment("missing").await,
            Err(ProviderError::NotFound(_))
        ));
        match p.get_payment("broken").await {
            Err(ProviderError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
