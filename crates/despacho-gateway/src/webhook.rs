// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp webhook endpoints.
//!
//! The POST handler acknowledges as soon as the signature and JSON check
//! out. Processing runs on a detached task so a provider timeout or client
//! disconnect cannot cancel it halfway.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use despacho_core::DespachoError;
use despacho_whatsapp::WebhookPayload;
use despacho_whatsapp::webhook::SIGNATURE_HEADER;
use tracing::{debug, info, warn};

use crate::handlers::ApiError;
use crate::server::GatewayState;

/// Secrets of the webhook subscription.
#[derive(Clone, Default)]
pub struct WebhookConfig {
    /// `None` rejects every verification request.
    pub verify_token: Option<String>,
    /// `None` rejects every POST.
    pub app_secret: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("verify_token", &self.verify_token.as_ref().map(|_| "[redacted]"))
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// GET /webhooks/whatsapp
pub async fn verify(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let expected = state.webhook.verify_token.as_deref();

    match (mode, token, expected) {
        (Some("subscribe"), Some(token), Some(expected)) if token == expected => {
            info!("webhook subscription verified");
            let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(mode = ?mode, "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhooks/whatsapp
pub async fn receive(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.webhook.app_secret.as_deref() else {
        warn!("webhook app secret not configured -- rejecting payload");
        despacho_prometheus::record_webhook_message("rejected");
        return ApiError(DespachoError::InvalidSignature).into_response();
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = despacho_whatsapp::verify_signature(secret.as_bytes(), &body, signature) {
        warn!(code = e.code(), "webhook signature rejected");
        despacho_prometheus::record_webhook_message("rejected");
        return ApiError(e).into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            despacho_prometheus::record_webhook_message("malformed");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid JSON payload"})),
            )
                .into_response();
        }
    };

    debug!(entries = payload.entry.len(), "webhook payload accepted");
    despacho_prometheus::record_webhook_message("received");
    let sink = state.sink.clone();
    tokio::spawn(async move {
        sink.process(payload).await;
    });

    (StatusCode::OK, Json(serde_json::json!({"status": "received"}))).into_response()
}
