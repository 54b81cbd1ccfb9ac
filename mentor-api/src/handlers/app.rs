use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing::warn;

use mentor_common::allocator::MentorAllocator;
use mentor_common::capacity::CapacityStore;
use mentor_common::metrics;
use mentor_common::registration::RegistrationCoordinator;
use mentor_common::retry::RetryPolicy;
use mentor_common::stats::{PgProjectLedger, StatsReporter};

use super::{assignment, capacity, registration, stats};

/// Everything the handlers need, cheap to clone into each request.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: CapacityStore,
    pub allocator: MentorAllocator,
    pub registration: RegistrationCoordinator,
    pub stats: StatsReporter,
    pub default_max_students: i32,
}

impl AppState {
    pub fn new(pool: PgPool, retry_policy: RetryPolicy, default_max_students: i32) -> Self {
        let allocator = MentorAllocator::new(pool.clone(), retry_policy);
        let registration =
            RegistrationCoordinator::new(pool.clone(), allocator.clone(), default_max_students);
        let stats = StatsReporter::new(pool.clone(), Arc::new(PgProjectLedger::new(pool.clone())));

        Self {
            store: CapacityStore::new_from_pool(pool.clone()),
            pool,
            allocator,
            registration,
            stats,
            default_max_students,
        }
    }
}

pub fn app(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(readiness))
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .route("/users", routing::post(registration::post))
        .route("/assign/:student_id", routing::post(assignment::assign))
        .route("/release/:student_id", routing::post(assignment::release))
        .route("/capacity", routing::get(capacity::list))
        .route(
            "/capacity/:mentor_id",
            routing::post(capacity::initialize).put(capacity::update),
        )
        .route("/stats", routing::get(stats::summary))
        .route("/stats/:mentor_id", routing::get(stats::mentor))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(metrics::track_metrics))
}

pub async fn index() -> &'static str {
    "mentor capacity api"
}

pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(error) => {
            warn!("readiness check failed: {}", error);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
