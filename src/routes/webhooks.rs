use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::state::AppState;
use crate::utils::signature::verify_signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Subscription,
    Payment,
}

impl EventKind {
    fn body_key(self) -> &'static str {
        match self {
            EventKind::Subscription => "providerSubscriptionId",
            EventKind::Payment => "providerPaymentId",
        }
    }

    fn accepts_type(self, event_type: &str) -> bool {
        match self {
            EventKind::Subscription => {
                matches!(event_type, "subscription_preapproval" | "preapproval")
            }
            EventKind::Payment => event_type == "payment",
        }
    }
}

fn id_value(val: &Value) -> Option<String> {
    match val {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Accepts `{providerSubscriptionId}` / `{providerPaymentId}`, the provider's
// `{"type", "data": {"id"}}` body, or `?data.id=` on the query string.
fn extract_event_id(kind: EventKind, body: &Value, query: &HashMap<String, String>) -> Option<String> {
    body.get(kind.body_key())
        .and_then(id_value)
        .or_else(|| body.get("data").and_then(|d| d.get("id")).and_then(id_value))
        .or_else(|| {
            query
                .get("data.id")
                .or_else(|| query.get("id"))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

fn extract_event_type<'a>(body: &'a Value, query: &'a HashMap<String, String>) -> Option<&'a str> {
    body.get("type")
        .and_then(|v| v.as_str())
        .or_else(|| query.get("type").map(|s| s.as_str()))
        .or_else(|| query.get("topic").map(|s| s.as_str()))
}

fn received() -> Response {
    Json(json!({ "received": true })).into_response()
}

/// Shared front half of both webhook endpoints. Returns the id to reconcile,
/// or `None` when the event should be acknowledged and dropped.
fn accept_event(
    kind: EventKind,
    app_state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &Bytes,
) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    if let Some(event_type) = extract_event_type(&payload, query) {
        if !kind.accepts_type(event_type) {
            debug!(?kind, event_type, "ignoring webhook of unrelated type");
            return None;
        }
    }

    let Some(id) = extract_event_id(kind, &payload, query) else {
        warn!(?kind, "webhook without a resource id");
        return None;
    };

    if let Some(secret) = app_state.config.provider.webhook_secret.as_deref() {
        let signature = headers.get("x-signature").and_then(|h| h.to_str().ok());
        let request_id = headers.get("x-request-id").and_then(|h| h.to_str().ok());
        let verified = signature
            .map(|sig| verify_signature(secret, sig, request_id, &id))
            .unwrap_or(false);
        if !verified {
            warn!(?kind, %id, "webhook signature verification failed");
            return None;
        }
    }

    Some(id)
}

// POST /api/webhooks/subscription-event
pub async fn subscription_event(
    State(app_state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(id) = accept_event(EventKind::Subscription, &app_state, &headers, &query, &body) {
        app_state.reconciler.dispatch_subscription_event(id);
    }
    received()
}

// POST /api/webhooks/payment-event
pub async fn payment_event(
    State(app_state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(id) = accept_event(EventKind::Payment, &app_state, &headers, &query, &body) {
        app_state.reconciler.dispatch_payment_event(id);
    }
    received()
}
