use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Value, json};

use super::ApiEnvelope;
use crate::error::{ApiErrorResponse, EntregasError};
use crate::router::EntregasState;
use crate::rut;
use crate::types::delivery::Commune;

/// GET /api/health
pub async fn health(State(state): State<EntregasState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "engine": state.deliveries.db().engine().as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "communes": "GET /api/comunas",
            "rut": "GET /api/rut/{rut}",
            "deliveries": "GET|POST /api/deliveries",
            "delivery": "GET|PUT|DELETE /api/deliveries/{id}",
        },
    }))
}

/// GET /api/comunas
pub async fn communes(
    State(state): State<EntregasState>,
) -> Result<Json<ApiEnvelope<Vec<Commune>>>, EntregasError> {
    let rows = state.deliveries.communes().await?;
    Ok(Json(ApiEnvelope::list(rows)))
}

#[derive(Debug, Serialize)]
pub struct RutCheck {
    pub valid: bool,
    pub formatted: String,
}

/// GET /api/rut/{rut}
pub async fn check_rut(Path(input): Path<String>) -> Json<RutCheck> {
    Json(RutCheck {
        valid: rut::validate(&input),
        formatted: rut::format(&input),
    })
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse::new("NOT_FOUND", "Ruta no encontrada")),
    )
}
