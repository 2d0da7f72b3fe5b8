//! HTTP admin API for the saga orchestration engine.
//!
//! Provides REST endpoints to start, inspect, retry and cancel sagas, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::order_fulfillment;
use saga::{
    InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService, OrchestratorConfig,
    SagaError, SagaOrchestrator, SagaStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::sagas::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/sagas", post(routes::sagas::start::<S>))
        .route("/sagas", get(routes::sagas::list::<S>))
        .route("/sagas/stats", get(routes::sagas::stats::<S>))
        .route("/sagas/{id}", get(routes::sagas::get::<S>))
        .route("/sagas/{id}/retry", post(routes::sagas::retry::<S>))
        .route("/sagas/{id}/cancel", post(routes::sagas::cancel::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The in-memory downstream services behind the sample order saga.
#[derive(Debug, Clone, Default)]
pub struct DemoServices {
    pub inventory: InMemoryInventoryService,
    pub payment: InMemoryPaymentService,
    pub shipping: InMemoryShippingService,
}

/// Creates the default application state: the order fulfillment saga over
/// `store`, backed by in-memory services.
pub fn create_default_state<S: SagaStore + 'static>(
    store: S,
    config: OrchestratorConfig,
) -> Result<(Arc<AppState<S>>, DemoServices), SagaError> {
    let services = DemoServices::default();
    let registry = order_fulfillment::registry(
        services.inventory.clone(),
        services.payment.clone(),
        services.shipping.clone(),
    )?;

    let orchestrator = SagaOrchestrator::new(
        store,
        registry,
        config.with_saga_type(order_fulfillment::SAGA_TYPE),
    );

    Ok((Arc::new(AppState { orchestrator }), services))
}
