use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::errors::entitlement_error_response;
use crate::models::plan::BillingPeriod;
use crate::responses::JsonResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub user_id: Uuid,
    pub plan_id: String,
    #[serde(default)]
    pub billing_period: Option<BillingPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub user_id: Uuid,
}

// POST /api/subscriptions
pub async fn create_subscription(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Response {
    match app_state
        .subscriptions
        .create_subscription(payload.user_id, &payload.plan_id, payload.billing_period)
        .await
    {
        Ok(started) => Json(started).into_response(),
        Err(err) => entitlement_error_response(err),
    }
}

// DELETE /api/subscriptions
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    Json(payload): Json<CancelSubscriptionRequest>,
) -> Response {
    match app_state.subscriptions.cancel_by_user(payload.user_id).await {
        Ok(_) => JsonResponse::success("Subscription cancelled").into_response(),
        Err(err) => entitlement_error_response(err),
    }
}

// GET /api/subscriptions/{user_id}
pub async fn get_active_subscription(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    match app_state.subscriptions.get_active_subscription(user_id).await {
        Ok(Some(subscription)) => Json(json!({ "subscription": subscription })).into_response(),
        Ok(None) => JsonResponse::not_found("No active subscription found").into_response(),
        Err(err) => entitlement_error_response(err),
    }
}
