//! Readiness gate.
//!
//! Requests are held back with `503 Service Unavailable` until the store has
//! been initialized. The gate only moves forward: once [`GateState::Ready`],
//! it stays there for the life of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskboard_core::{StoreError, TodoStore};

use crate::api::{self, ApiErrorBody, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Initializing,
    Ready,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn state(&self) -> GateState {
        if self.ready.load(Ordering::Acquire) {
            GateState::Ready
        } else {
            GateState::Initializing
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == GateState::Ready
    }
}

/// Middleware rejecting every request while the gate is initializing.
pub async fn require_ready(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.gate.is_ready() {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "rejecting request, store not ready");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "1")],
        Json(ApiErrorBody {
            error: "Service is starting, database not ready".to_string(),
        }),
    )
        .into_response()
}

/// How hard [`bring_up`] tries before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Initialize the store and open the gate.
///
/// Retries with exponential backoff. If every attempt fails the last error is
/// returned and the gate stays [`GateState::Initializing`].
pub async fn bring_up(
    store: Arc<dyn TodoStore>,
    gate: ReadinessGate,
    policy: RetryPolicy,
) -> Result<(), StoreError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = api::with_store(Arc::clone(&store), |s| s.initialize()).await;

        match result {
            Ok(()) => {
                gate.mark_ready();
                tracing::info!(attempt, "store ready, accepting requests");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(attempt, error = %e, ?delay, "store initialization failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "store initialization failed, giving up");
                return Err(e);
            }
        }
    }
}
