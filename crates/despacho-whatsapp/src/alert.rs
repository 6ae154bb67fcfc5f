// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwards firing platform alerts to the admin phone.

use std::sync::Arc;

use async_trait::async_trait;
use despacho_config::model::AlertsConfig;
use despacho_core::{Delivery, DeliveryHandler, DespachoError, WhatsAppCredentials};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::client::WhatsAppClient;
use crate::phone::clean_phone;
use crate::templates::ALERT_TEMPLATE;
use crate::types::TemplateMessage;

/// Alertmanager webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertPayload {
    pub status: String,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    pub status: String,
    #[serde(default)]
    pub labels: AlertLabels,
    #[serde(default)]
    pub annotations: AlertAnnotations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertLabels {
    #[serde(default)]
    pub alertname: String,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertAnnotations {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Alert {
    fn alert_type(&self) -> String {
        match &self.labels.severity {
            Some(severity) => format!("{} ({severity})", self.labels.alertname),
            None => self.labels.alertname.clone(),
        }
    }

    fn summary(&self) -> String {
        self.annotations
            .summary
            .clone()
            .or_else(|| self.annotations.description.clone())
            .unwrap_or_else(|| "Sin resumen".to_string())
    }
}

/// Sends `alerta_servidor` with the platform's own credentials.
pub struct AlertNotifier {
    client: Arc<dyn WhatsAppClient>,
    credentials: WhatsAppCredentials,
    admin_phone: String,
}

impl AlertNotifier {
    pub fn new(
        client: Arc<dyn WhatsAppClient>,
        credentials: WhatsAppCredentials,
        admin_phone: &str,
    ) -> Result<Self, DespachoError> {
        Ok(Self {
            client,
            credentials,
            admin_phone: clean_phone(admin_phone)?,
        })
    }

    /// Build the notifier from configuration. `None` when alerts are disabled.
    pub fn from_config(
        config: &AlertsConfig,
        client: Arc<dyn WhatsAppClient>,
    ) -> Result<Option<Self>, DespachoError> {
        if !config.enabled {
            return Ok(None);
        }
        let (Some(phone), Some(phone_number_id), Some(token)) = (
            config.admin_phone.as_deref(),
            config.phone_number_id.as_deref(),
            config.access_token.as_deref(),
        ) else {
            return Err(DespachoError::Config(
                "alerts.enabled requires admin_phone, phone_number_id and access_token".into(),
            ));
        };
        Self::new(client, WhatsAppCredentials::new(phone_number_id, token), phone).map(Some)
    }

    /// Send one message per firing alert. Returns the number sent.
    ///
    /// A failed send does not stop the remaining alerts. The first error is
    /// returned only when nothing was sent, so a retry never repeats a
    /// delivered alert.
    pub async fn notify(&self, payload: &AlertPayload) -> Result<usize, DespachoError> {
        if payload.status != "firing" {
            debug!(status = %payload.status, "ignoring non-firing alert group");
            return Ok(0);
        }
        let mut sent = 0;
        let mut first_error = None;
        for alert in payload.alerts.iter().filter(|a| a.status == "firing") {
            let message = TemplateMessage::new(
                self.admin_phone.clone(),
                &ALERT_TEMPLATE,
                vec![alert.alert_type(), alert.summary()],
            );
            match self.client.send_template(&self.credentials, &message).await {
                Ok(message_id) => {
                    info!(alertname = %alert.labels.alertname, %message_id, "alert forwarded");
                    sent += 1;
                }
                Err(e) => {
                    warn!(alertname = %alert.labels.alertname, error = %e, "alert send failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) if sent == 0 => Err(e),
            _ => Ok(sent),
        }
    }
}

#[async_trait]
impl DeliveryHandler for AlertNotifier {
    fn name(&self) -> &str {
        "alerts"
    }

    async fn handle(&self, _routing_key: &str, payload: &[u8]) -> Delivery {
        let payload: AlertPayload = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "undecodable alert payload");
                return Delivery::Reject;
            }
        };
        match self.notify(&payload).await {
            Ok(_) => Delivery::Ack,
            Err(e) if e.is_transport() => {
                warn!(error = %e, "alert send failed, requeueing");
                Delivery::Requeue
            }
            Err(e) => {
                error!(error = %e, "alert send rejected by provider");
                Delivery::Ack
            }
        }
    }
}
