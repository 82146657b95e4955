//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use lorekeeper_api::state::{AppState, Collaborators};
use lorekeeper_document_store::InMemoryDocumentStore;
use lorekeeper_jobs::{JobQueueConfig, RetryPolicy};
use lorekeeper_test_support::{
    EchoPromptRenderer, FixedClock, RecordingNotifier, ScriptedCompletionProvider, fixed_now,
};
use tower::ServiceExt;

/// A running engine over in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryDocumentStore>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.state.queue.shutdown();
    }
}

/// Build the full app router with deterministic collaborators. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app(provider: ScriptedCompletionProvider) -> TestApp {
    let store = Arc::new(InMemoryDocumentStore::new());
    let collaborators = Collaborators {
        store: store.clone(),
        renderer: Arc::new(EchoPromptRenderer),
        provider: Arc::new(provider),
        notifier: Arc::new(RecordingNotifier::new()),
        clock: Arc::new(FixedClock(fixed_now())),
    };
    let state = AppState::assemble(
        collaborators,
        JobQueueConfig::default(),
        RetryPolicy::exponential(3, Duration::from_millis(500)),
        Duration::from_secs(5),
    )
    .unwrap();

    TestApp {
        router: lorekeeper_api::app(state.clone()),
        state,
        store,
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}
