pub mod downloads;
pub(crate) mod errors;
pub mod plans;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Every endpoint the engine exposes, mounted under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/plans", get(plans::list_plans))
        .route("/downloads", post(downloads::authorize_download))
        .route("/quota/{user_id}", get(downloads::quota_status))
        .route(
            "/subscriptions",
            post(subscriptions::create_subscription).delete(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/{user_id}",
            get(subscriptions::get_active_subscription),
        )
        .route(
            "/webhooks/subscription-event",
            post(webhooks::subscription_event),
        )
        .route("/webhooks/payment-event", post(webhooks::payment_event));

    Router::new().nest("/api", api).with_state(state)
}
