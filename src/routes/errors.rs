use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::responses::JsonResponse;
use crate::services::EntitlementError;

pub(crate) fn entitlement_error_response(err: EntitlementError) -> Response {
    match err {
        EntitlementError::QuotaExhausted => JsonResponse::forbidden_with_code(
            "Daily download limit reached. Your quota resets tomorrow.",
            "quota_exhausted",
        )
        .into_response(),
        EntitlementError::AlreadySubscribed => JsonResponse::error_with_code(
            StatusCode::BAD_REQUEST,
            "You already have an active subscription. Cancel it before starting a new one.",
            "already_subscribed",
        )
        .into_response(),
        EntitlementError::SubscriptionNotFound => {
            JsonResponse::not_found("No active subscription found").into_response()
        }
        EntitlementError::UserNotFound => JsonResponse::not_found("User not found").into_response(),
        EntitlementError::ResourceNotFound => {
            JsonResponse::not_found("Resource not found").into_response()
        }
        EntitlementError::UnknownPlan(plan) => JsonResponse::error_with_code(
            StatusCode::BAD_REQUEST,
            &format!("Unknown plan: {plan}"),
            "unknown_plan",
        )
        .into_response(),
        EntitlementError::InvalidEvent(reason) => {
            JsonResponse::bad_request(&reason).into_response()
        }
        EntitlementError::ExternalProviderUnavailable(err) => {
            error!(?err, "payment provider call failed");
            JsonResponse::error_with_code(
                StatusCode::BAD_GATEWAY,
                "Payment provider is unavailable. Please try again shortly.",
                "provider_unavailable",
            )
            .into_response()
        }
        EntitlementError::Database(err) => {
            error!(?err, "entitlement query failed");
            JsonResponse::server_error("Internal server error").into_response()
        }
    }
}
