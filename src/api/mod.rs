//! HTTP surface for the task CRUD, reminder-creation and worker-trigger
//! operations.
//!
//! The caller's owner id arrives in the `x-owner-id` header, set by the
//! auth collaborator in front of this service. It is trusted as given.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::ReadThroughCache;
use crate::channels::DispatcherRegistry;
use crate::config::WorkerConfig;
use crate::persistence::db::Database;
use crate::queue::NotificationQueue;
use crate::reconcile::Reconciler;
use crate::service::TaskService;
use crate::worker::NotificationWorker;
use crate::{AppError, Result};

/// Header carrying the authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Task and reminder operations.
    pub service: TaskService,
    /// Worker triggered by `POST /worker/run`.
    pub worker: NotificationWorker,
    /// Sweep triggered by `POST /worker/reconcile`.
    pub reconciler: Reconciler,
}

impl AppState {
    /// Wire the service, worker and reconciler over one database and queue.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        queue: Arc<dyn NotificationQueue>,
        cache: ReadThroughCache,
        dispatchers: DispatcherRegistry,
        worker_config: &WorkerConfig,
    ) -> Self {
        let service = TaskService::new(Arc::clone(&db), Arc::clone(&queue), cache.clone());
        let worker = NotificationWorker::new(
            Arc::clone(&db),
            Arc::clone(&queue),
            cache,
            dispatchers,
            worker_config,
        );
        let reconciler = Reconciler::new(db, queue, service.scheduler().clone());
        Self {
            service,
            worker,
            reconciler,
        }
    }
}

/// Owner id extracted from [`OWNER_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for OwnerId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or_else(|| AppError::Validation(format!("missing {OWNER_HEADER} header")))
    }
}

/// HTTP status for an error surfaced to a caller.
#[must_use]
pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidTimeZone(_) | AppError::InvalidOffset(_) | AppError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::Store(_) | AppError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Config(_)
        | AppError::Cache(_)
        | AppError::Dispatch(_)
        | AppError::Http(_)
        | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(%self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the router over `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route(
            "/tasks/{id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route(
            "/tasks/{id}/reminders",
            post(handlers::add_reminders)
                .get(handlers::list_reminders)
                .delete(handlers::delete_reminders),
        )
        .route("/reminders/{id}", delete(handlers::delete_reminder))
        .route("/worker/run", post(handlers::run_worker))
        .route("/worker/reconcile", post(handlers::reconcile))
        .with_state(state)
}

/// Serve the HTTP surface on `127.0.0.1:port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the listener cannot be bound and
/// `AppError::Http` if the server fails.
pub async fn serve(state: Arc<AppState>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind http on {bind}: {err}")))?;
    serve_listener(state, listener, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails.
pub async fn serve_listener(
    state: Arc<AppState>,
    listener: TcpListener,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no address: {err}")))?;
    info!(%local, "starting http surface");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("http server error: {err}")))?;

    info!("http surface shut down");
    Ok(())
}
