use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde_json::{Value, json};

use super::ApiEnvelope;
use crate::error::EntregasError;
use crate::middleware::RequireKeyAuth;
use crate::router::EntregasState;
use crate::types::delivery::{Delivery, DeliveryFilter, DeliveryPatch, NewDelivery};

/// GET /api/deliveries
pub async fn list_deliveries(
    _auth: RequireKeyAuth,
    State(state): State<EntregasState>,
    filter: Result<Query<DeliveryFilter>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Vec<Delivery>>>, EntregasError> {
    let Query(filter) = filter.map_err(|e| EntregasError::Validation(e.body_text()))?;
    let rows = state.deliveries.list(&filter).await?;
    Ok(Json(ApiEnvelope::list(rows)))
}

/// GET /api/deliveries/{id}
pub async fn get_delivery(
    _auth: RequireKeyAuth,
    State(state): State<EntregasState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiEnvelope<Delivery>>, EntregasError> {
    let delivery = state.deliveries.get(id).await?;
    Ok(Json(ApiEnvelope::data(delivery)))
}

/// POST /api/deliveries -> 201 with the stored row.
pub async fn create_delivery(
    _auth: RequireKeyAuth,
    State(state): State<EntregasState>,
    body: Result<Json<NewDelivery>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<Delivery>>), EntregasError> {
    let Json(input) = body.map_err(|e| EntregasError::Validation(e.body_text()))?;
    let delivery = state.deliveries.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::data(delivery).with_message("Entrega creada exitosamente")),
    ))
}

/// PUT /api/deliveries/{id}
pub async fn update_delivery(
    _auth: RequireKeyAuth,
    State(state): State<EntregasState>,
    Path(id): Path<i64>,
    body: Result<Json<DeliveryPatch>, JsonRejection>,
) -> Result<Json<ApiEnvelope<Delivery>>, EntregasError> {
    let Json(patch) = body.map_err(|e| EntregasError::Validation(e.body_text()))?;
    let delivery = state.deliveries.update(id, patch).await?;
    Ok(Json(
        ApiEnvelope::data(delivery).with_message("Entrega actualizada exitosamente"),
    ))
}

/// DELETE /api/deliveries/{id}
pub async fn delete_delivery(
    _auth: RequireKeyAuth,
    State(state): State<EntregasState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, EntregasError> {
    state.deliveries.delete(id).await?;
    Ok(Json(json!({ "success": true, "message": "Entrega eliminada exitosamente" })))
}
