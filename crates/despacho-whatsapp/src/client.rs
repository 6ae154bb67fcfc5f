// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WhatsApp Cloud API.
//!
//! Provides the [`WhatsAppClient`] seam and [`CloudApiClient`], which builds
//! the request, authenticates with the business's bearer token, and retries
//! transient failures (timeouts, connect errors, 429, 5xx).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use despacho_config::model::WhatsAppConfig;
use despacho_core::{DespachoError, WhatsAppApiError, WhatsAppCredentials};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, SendResponse, TemplateMessage};

/// Sends template messages on behalf of a business.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Send `message` and return the provider message id.
    async fn send_template(
        &self,
        credentials: &WhatsAppCredentials,
        message: &TemplateMessage,
    ) -> Result<String, DespachoError>;
}

/// reqwest-backed Cloud API client.
///
/// Credentials are per request, so a single client serves every business.
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_wait: Duration,
    timeout: Duration,
}

impl CloudApiClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, DespachoError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DespachoError::Http {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_wait: Duration::from_secs(config.retry_wait_secs),
            timeout,
        })
    }

    /// Point the client at another base URL (mock servers in tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.base_url, phone_number_id)
    }

    fn transport_error(&self, e: reqwest::Error) -> DespachoError {
        if e.is_timeout() {
            DespachoError::Timeout {
                duration: self.timeout,
            }
        } else {
            DespachoError::Http {
                message: format!("whatsapp request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

#[async_trait]
impl WhatsAppClient for CloudApiClient {
    async fn send_template(
        &self,
        credentials: &WhatsAppCredentials,
        message: &TemplateMessage,
    ) -> Result<String, DespachoError> {
        let url = self.messages_url(&credentials.phone_number_id);
        let template = message.template.name.as_str();
        let started = Instant::now();
        let mut last_error: Option<DespachoError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, template, "retrying whatsapp send");
                tokio::time::sleep(self.retry_wait).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(credentials.access_token.expose_secret())
                .json(message)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    warn!(error = %e, template, "transient transport error, will retry");
                    last_error = Some(self.transport_error(e));
                    continue;
                }
                Err(e) => {
                    despacho_prometheus::record_template_send(template, "error");
                    return Err(self.transport_error(e));
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response.text().await.map_err(|e| self.transport_error(e))?;
                let parsed: Option<SendResponse> = serde_json::from_str(&body).ok();
                let Some(id) = parsed.and_then(|r| r.messages.into_iter().next().map(|m| m.id))
                else {
                    despacho_prometheus::record_template_send(template, "error");
                    return Err(DespachoError::WhatsApp(WhatsAppApiError {
                        code: None,
                        subcode: None,
                        http_status: status.as_u16(),
                        message: "La respuesta de WhatsApp no incluyó el id del mensaje"
                            .to_string(),
                        provider_message: body,
                    }));
                };
                despacho_prometheus::record_template_send(template, "sent");
                despacho_prometheus::record_send_latency(started.elapsed().as_secs_f64());
                debug!(template, message_id = %id, "template sent");
                return Ok(id);
            }

            let body = response.text().await.unwrap_or_default();
            let error = api_error(status, &body);
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, template, "transient whatsapp error, will retry");
                last_error = Some(error);
                continue;
            }

            despacho_prometheus::record_template_send(template, "error");
            return Err(error);
        }

        despacho_prometheus::record_template_send(template, "error");
        Err(last_error.unwrap_or_else(|| DespachoError::Http {
            message: "whatsapp send failed after retries".into(),
            source: None,
        }))
    }
}

/// Returns true for HTTP status codes worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

fn api_error(status: reqwest::StatusCode, body: &str) -> DespachoError {
    let (code, subcode, provider_message) =
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(parsed) => (
                parsed.error.code,
                parsed.error.error_subcode,
                parsed.error.message,
            ),
            Err(_) => (None, None, body.to_string()),
        };
    DespachoError::WhatsApp(WhatsAppApiError {
        code,
        subcode,
        http_status: status.as_u16(),
        message: spanish_message(code, status.as_u16()),
        provider_message,
    })
}

/// Human-readable Spanish message for a provider error code.
pub fn spanish_message(code: Option<i64>, http_status: u16) -> String {
    let known = match code {
        Some(0) => "No fue posible autenticarse con WhatsApp",
        Some(4) | Some(80007) | Some(130429) => {
            "Se alcanzó el límite de envío de mensajes, intenta más tarde"
        }
        Some(10) => "La aplicación no tiene permiso para enviar mensajes",
        Some(100) => "La solicitud contiene un parámetro inválido",
        Some(131000) => "WhatsApp reportó un error inesperado",
        Some(131005) => "Acceso denegado al número de WhatsApp",
        Some(131008) => "Falta un parámetro obligatorio en la solicitud",
        Some(131009) => "Un parámetro de la solicitud no es válido",
        Some(131026) => "Mensaje no entregable: el destinatario no tiene WhatsApp o no aceptó los términos",
        Some(131047) => "Pasaron más de 24 horas desde la última respuesta del cliente",
        Some(131051) => "Tipo de mensaje no soportado",
        Some(131056) => "Demasiados mensajes enviados al mismo destinatario",
        Some(132000) => "La cantidad de variables no coincide con la plantilla",
        Some(132001) => "La plantilla no existe o no está aprobada en este idioma",
        Some(132005) => "El texto de la plantilla con variables es demasiado largo",
        Some(132007) => "El contenido de la plantilla infringe las políticas de WhatsApp",
        Some(132012) => "El formato de las variables no coincide con la plantilla",
        Some(133010) => "El número de teléfono no está registrado en WhatsApp Business",
        Some(190) => "El token de acceso es inválido o expiró",
        Some(368) => "La cuenta fue bloqueada temporalmente por infringir políticas",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_string();
    }
    match code {
        Some(c) => format!("Error de WhatsApp (código {c}, HTTP {http_status})"),
        None => format!("Error de WhatsApp (HTTP {http_status})"),
    }
}
