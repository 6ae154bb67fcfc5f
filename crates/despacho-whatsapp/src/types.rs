// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cloud API request and response bodies for template messages.

use serde::{Deserialize, Serialize};

use crate::templates::TemplateDefinition;

/// Body of `POST /<phone_number_id>/messages` for a template message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub template: TemplatePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatePayload {
    pub name: String,
    pub language: Language,
    /// Absent when the template declares no variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: &'static str,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub parameter_type: &'static str,
    pub text: String,
}

impl TemplateMessage {
    /// Build the message for `template` with already-bound positional values.
    pub fn new(to: impl Into<String>, template: &TemplateDefinition, values: Vec<String>) -> Self {
        let components = (!template.variables.is_empty()).then(|| {
            vec![Component {
                component_type: "body",
                parameters: values
                    .into_iter()
                    .map(|text| Parameter {
                        parameter_type: "text",
                        text,
                    })
                    .collect(),
            }]
        });
        Self {
            messaging_product: "whatsapp",
            to: to.into(),
            message_type: "template",
            template: TemplatePayload {
                name: template.name.to_string(),
                language: Language {
                    code: template.language.to_string(),
                },
                components,
            },
        }
    }

    /// Parameter texts in positional order.
    pub fn values(&self) -> Vec<&str> {
        self.template
            .components
            .iter()
            .flatten()
            .flat_map(|c| c.parameters.iter().map(|p| p.text.as_str()))
            .collect()
    }
}

/// Successful send response.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Graph API error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;

    #[test]
    fn payload_with_variables_has_body_component() {
        let t = templates::get(templates::PEDIDO_CONFIRMADO).unwrap();
        let msg = TemplateMessage::new("573001234567", t, vec!["ORD-555".into()]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "573001234567",
                "type": "template",
                "template": {
                    "name": "pedido_confirmado",
                    "language": {"code": "es"},
                    "components": [{
                        "type": "body",
                        "parameters": [{"type": "text", "text": "ORD-555"}]
                    }]
                }
            })
        );
        assert_eq!(msg.values(), vec!["ORD-555"]);
    }

    #[test]
    fn payload_without_variables_omits_components() {
        let t = templates::get(templates::HANDOFF_ASESOR).unwrap();
        let json = serde_json::to_value(TemplateMessage::new("573001234567", t, vec![])).unwrap();
        assert!(json["template"].get("components").is_none());
    }

    #[test]
    fn error_body_parses_with_missing_fields() {
        let body = r#"{"error":{"message":"Invalid OAuth access token","type":"OAuthException","code":190}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.code, Some(190));
        assert_eq!(parsed.error.error_subcode, None);
        assert_eq!(parsed.error.error_type, "OAuthException");
    }
}
