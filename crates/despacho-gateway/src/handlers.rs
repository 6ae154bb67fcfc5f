// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health, metrics and inventory read handlers.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use despacho_core::inventory::InventoryLevel;
use despacho_core::{DespachoError, ErrorKind, HealthStatus};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// A [`DespachoError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DespachoError);

impl From<DespachoError> for ApiError {
    fn from(e: DespachoError) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &DespachoError) -> StatusCode {
    match error.kind() {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::State | ErrorKind::Resource => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Signature => StatusCode::UNAUTHORIZED,
        ErrorKind::External => StatusCode::BAD_GATEWAY,
        ErrorKind::Transport => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub adapters: BTreeMap<String, HealthStatus>,
}

/// GET /health
///
/// 503 when any adapter reports unhealthy.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let mut adapters = BTreeMap::new();
    for adapter in state.health.adapters.iter() {
        let status = adapter
            .health_check()
            .await
            .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        adapters.insert(adapter.name().to_string(), status);
    }

    let unhealthy = adapters
        .values()
        .any(|s| matches!(s, HealthStatus::Unhealthy(_)));
    let degraded = adapters.values().any(|s| !s.is_healthy());
    let (code, status) = match (unhealthy, degraded) {
        (true, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        (false, true) => (StatusCode::OK, "degraded"),
        _ => (StatusCode::OK, "ok"),
    };

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        adapters,
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BusinessQuery {
    pub business_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductInventoryResponse {
    pub product_id: i64,
    pub business_id: i64,
    pub quantity: i64,
    pub reserved_qty: i64,
    pub available_qty: i64,
    pub levels: Vec<InventoryLevel>,
}

/// GET /v1/inventory/products/{product_id}?business_id=
pub async fn get_product_inventory(
    State(state): State<GatewayState>,
    Path(product_id): Path<i64>,
    Query(query): Query<BusinessQuery>,
) -> Result<Json<ProductInventoryResponse>, ApiError> {
    let levels = state
        .reader
        .product_levels(product_id, query.business_id)
        .await?;
    Ok(Json(ProductInventoryResponse {
        product_id,
        business_id: query.business_id,
        quantity: levels.iter().map(|l| l.quantity).sum(),
        reserved_qty: levels.iter().map(|l| l.reserved_qty).sum(),
        available_qty: levels.iter().map(|l| l.available_qty).sum(),
        levels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status() {
        assert_eq!(
            status_for(&DespachoError::InvalidQuantity(0)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&DespachoError::ProductNotFound(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&DespachoError::InvalidSignature),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&DespachoError::broker("down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_response_carries_code() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "warehouse not found: 3".into(),
            code: "WAREHOUSE_NOT_FOUND".into(),
        })
        .unwrap();
        assert!(json.contains("\"code\":\"WAREHOUSE_NOT_FOUND\""));
    }
}
