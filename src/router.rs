use std::sync::Arc;

use axum::{Router, middleware::from_fn, routing::get};

use crate::handlers::{deliveries, meta};
use crate::middleware::log_request;
use crate::service::deliveries::DeliveryService;

#[derive(Clone)]
pub struct EntregasState {
    pub deliveries: DeliveryService,
    pub api_key: Arc<str>,
}

impl EntregasState {
    pub fn new(deliveries: DeliveryService, api_key: Arc<str>) -> Self {
        Self {
            deliveries,
            api_key,
        }
    }
}

pub fn entregas_router(state: EntregasState) -> Router {
    let api = Router::new()
        .route("/", get(meta::index))
        .route("/health", get(meta::health))
        .route("/comunas", get(meta::communes))
        .route("/rut/{rut}", get(meta::check_rut))
        .route(
            "/deliveries",
            get(deliveries::list_deliveries).post(deliveries::create_delivery),
        )
        .route(
            "/deliveries/{id}",
            get(deliveries::get_delivery)
                .put(deliveries::update_delivery)
                .delete(deliveries::delete_delivery),
        );

    Router::new()
        .nest("/api", api)
        .fallback(meta::not_found)
        .layer(from_fn(log_request))
        .with_state(state)
}
