//! HTTP API for the order transaction engine.
//!
//! Exposes order placement, status administration, discounts, loyalty and
//! live status notifications over REST and server-sent events, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::{Collaborators, EngineConfig, OrderEngine};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{ConnectionRegistry, Dispatcher};
use projections::{LoyaltyBalanceView, Projection, ProjectionProcessor, VerifiedPurchasesView};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub engine: OrderEngine<S>,
    pub registry: ConnectionRegistry,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
    pub loyalty_view: LoyaltyBalanceView,
    pub purchases_view: VerifiedPurchasesView,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::place::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/transitions",
            get(routes::orders::transitions::<S>),
        )
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route("/loyalty", get(routes::loyalty::balance::<S>))
        .route(
            "/admin/loyalty/{customer_id}/reconcile",
            get(routes::loyalty::reconcile::<S>),
        )
        .route("/discounts/validate", post(routes::discounts::validate::<S>))
        .route(
            "/admin/discounts",
            post(routes::discounts::create::<S>).get(routes::discounts::list::<S>),
        )
        .route(
            "/admin/discounts/{code}",
            get(routes::discounts::get::<S>)
                .patch(routes::discounts::set_active::<S>)
                .delete(routes::discounts::delete::<S>),
        )
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/admin/products", post(routes::products::upsert::<S>))
        .route(
            "/admin/products/{id}/restock",
            post(routes::products::restock::<S>),
        )
        .route(
            "/addresses",
            post(routes::addresses::register::<S>).get(routes::addresses::list::<S>),
        )
        .route(
            "/purchases/{product_id}",
            get(routes::purchases::verify::<S>),
        )
        .route(
            "/notifications",
            get(routes::notifications::subscribe::<S>),
        )
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

/// Wires the engine, projections and notification registry over `store`.
///
/// The returned [`Dispatcher`] must be spawned for notifications to reach
/// connected customers.
pub fn create_state<S: EventStore + Clone + 'static>(
    store: S,
    collaborators: Collaborators,
    config: &Config,
) -> (Arc<AppState<S>>, Dispatcher) {
    let registry = ConnectionRegistry::default();
    let (notifier, dispatcher) = Dispatcher::channel(
        registry.clone(),
        config.notify_channel_capacity,
        config.notify_timeout,
    );

    let engine = OrderEngine::new(
        store.clone(),
        collaborators,
        notifier,
        EngineConfig {
            persistence_timeout: config.persistence_timeout,
        },
    );

    let loyalty_view = LoyaltyBalanceView::new();
    let purchases_view = VerifiedPurchasesView::new();

    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(loyalty_view.clone()) as Box<dyn Projection>);
    processor.register(Box::new(purchases_view.clone()) as Box<dyn Projection>);

    let state = Arc::new(AppState {
        engine,
        registry,
        projection_processor: Arc::new(processor),
        loyalty_view,
        purchases_view,
    });

    (state, dispatcher)
}
