mod error;
mod handlers;

use std::path::Path;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use taskboard_core::{StoreError, TodoStore};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::gate::{self, ReadinessGate};
use crate::views::Views;

pub use error::{ApiError, ApiErrorBody, PageError};

/// Service context shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TodoStore>,
    pub gate: ReadinessGate,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(store: Arc<dyn TodoStore>, gate: ReadinessGate, views: Views) -> Self {
        Self {
            store,
            gate,
            views: Arc::new(views),
        }
    }
}

/// Run a store call on the blocking pool; SQLite calls never block a runtime worker.
pub async fn with_store<T, F>(store: Arc<dyn TodoStore>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn TodoStore) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .unwrap_or_else(|e| {
            Err(StoreError::Io(std::io::Error::other(format!(
                "store task failed: {e}"
            ))))
        })
}

/// Build the router. Everything except `/health` sits behind the readiness gate;
/// when `static_dir` is given, unmatched paths are served from it.
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut gated = Router::new()
        .route("/", get(handlers::list_page))
        .route("/todos", post(handlers::create_todo))
        .route("/todos/{id}/toggle", post(handlers::toggle_todo))
        .route("/todos/{id}/delete", post(handlers::delete_todo))
        .route("/todos/{id}/edit", get(handlers::edit_page))
        .route("/todos/{id}/update", post(handlers::update_todo))
        .route("/api/todos", get(handlers::list_todos_json));

    if let Some(dir) = static_dir {
        gated = gated.fallback_service(ServeDir::new(dir));
    }

    let gated = gated.layer(middleware::from_fn_with_state(
        state.clone(),
        gate::require_ready,
    ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
