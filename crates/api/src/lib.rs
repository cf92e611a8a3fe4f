//! HTTP API for carts and checkout.
//!
//! Every `/api` route resolves the caller from a bearer token, then drives
//! [`CartService`] or [`OrderFactory`]. Structured logging comes from
//! tracing, and Prometheus metrics are served at `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use domain::{CartService, CatalogLookup, OrderFactory, UserLocks};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{ProjectionProcessor, UserOrdersView};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::Authenticator;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub carts: CartService<S>,
    pub orders: OrderFactory<S>,
    pub user_orders: UserOrdersView,
    pub projections: ProjectionProcessor<S>,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route(
            "/api/cart",
            get(routes::cart::get::<S>)
                .post(routes::cart::add_item::<S>)
                .put(routes::cart::set_quantity::<S>)
                .delete(routes::cart::clear::<S>),
        )
        .route(
            "/api/orders",
            get(routes::orders::list::<S>).post(routes::orders::checkout::<S>),
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

/// Wires the cart and order services to one store, one catalog and one set
/// of per-user locks, and registers the order list projection.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    catalog: CatalogLookup,
    authenticator: Arc<dyn Authenticator>,
) -> Arc<AppState<S>> {
    let locks = UserLocks::new();
    let user_orders = UserOrdersView::new();

    let mut projections = ProjectionProcessor::new(event_store.clone());
    projections.register(Box::new(user_orders.clone()));

    Arc::new(AppState {
        carts: CartService::new(event_store.clone(), catalog.clone(), locks.clone()),
        orders: OrderFactory::new(event_store, catalog, locks),
        user_orders,
        projections,
        authenticator,
    })
}
