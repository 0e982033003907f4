//! Shared fixtures for route tests.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
};
use serde_json::Value;

use crate::config::Config;
use crate::db::mock_db::MockDb;
use crate::services::provider::MockPaymentProvider;
use crate::state::AppState;

pub(crate) fn test_state(db: Arc<MockDb>, provider: MockPaymentProvider) -> AppState {
    test_state_with_config(db, provider, Config::for_tests())
}

pub(crate) fn test_state_with_config(
    db: Arc<MockDb>,
    provider: MockPaymentProvider,
    config: Config,
) -> AppState {
    AppState::new(
        db.clone(),
        db.clone(),
        db.clone(),
        db,
        Arc::new(provider),
        Arc::new(config),
    )
}

pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) async fn body_json(resp: Response<Body>) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Polls until a background webhook task has had a chance to land.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
