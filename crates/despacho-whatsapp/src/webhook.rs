// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook payloads and signature verification.
//!
//! The provider signs every POST body with HMAC-SHA256 keyed by the app
//! secret and sends `X-Hub-Signature-256: sha256=<hex>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use despacho_core::DespachoError;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase header name carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check `header` against the HMAC-SHA256 of `body`.
///
/// A missing header, a missing `sha256=` prefix, or non-hex digits fail
/// with `MISSING_SIGNATURE`; a well-formed but wrong digest fails with
/// `INVALID_SIGNATURE`. The comparison is constant-time.
pub fn verify_signature(
    app_secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), DespachoError> {
    let expected = header
        .and_then(|h| h.trim().strip_prefix("sha256="))
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(DespachoError::MissingSignature)?;

    let mut mac = HmacSha256::new_from_slice(app_secret)
        .map_err(|e| DespachoError::Internal(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| DespachoError::InvalidSignature)
}

/// Compute the `sha256=<hex>` header value for `body`.
pub fn sign(app_secret: &[u8], body: &[u8]) -> Result<String, DespachoError> {
    let mut mac = HmacSha256::new_from_slice(app_secret)
        .map_err(|e| DespachoError::Internal(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<PhoneMetadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneMetadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

/// A customer message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub button: Option<ButtonBody>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Quick-reply button press on a template.
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonBody {
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    #[serde(rename = "type", default)]
    pub interactive_type: String,
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: String,
    pub title: String,
}

/// Delivery status callback for a message we sent.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    /// Unix seconds as a decimal string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub title: String,
}

impl StatusUpdate {
    /// The callback time, if `timestamp` holds valid Unix seconds.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.timestamp.trim().parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

/// The user-visible text of a message: the body of a text message, the
/// label of a pressed button, or the title of an interactive reply.
/// Anything else yields an empty string.
pub fn get_message_text(message: &InboundMessage) -> String {
    match message.message_type.as_str() {
        "text" => message.text.as_ref().map(|t| t.body.clone()),
        "button" => message.button.as_ref().map(|b| b.text.clone()),
        "interactive" => message.interactive.as_ref().and_then(|i| {
            match i.interactive_type.as_str() {
                "button_reply" => i.button_reply.as_ref(),
                "list_reply" => i.list_reply.as_ref(),
                _ => None,
            }
            .map(|r| r.title.clone())
        }),
        _ => None,
    }
    .unwrap_or_default()
}

/// Receives verified webhook payloads for processing after the HTTP ack.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn process(&self, payload: WebhookPayload);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> InboundMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn message_text_for_each_kind() {
        let text = message(serde_json::json!({
            "from": "573001234567", "id": "wamid.1", "type": "text",
            "text": {"body": "No me llegó a tiempo"}
        }));
        assert_eq!(get_message_text(&text), "No me llegó a tiempo");

        let button = message(serde_json::json!({
            "from": "573001234567", "id": "wamid.2", "type": "button",
            "button": {"text": "Confirmar pedido", "payload": "Confirmar pedido"}
        }));
        assert_eq!(get_message_text(&button), "Confirmar pedido");

        let button_reply = message(serde_json::json!({
            "from": "573001234567", "id": "wamid.3", "type": "interactive",
            "interactive": {"type": "button_reply", "button_reply": {"id": "b1", "title": "Asesor"}}
        }));
        assert_eq!(get_message_text(&button_reply), "Asesor");

        let list_reply = message(serde_json::json!({
            "from": "573001234567", "id": "wamid.4", "type": "interactive",
            "interactive": {"type": "list_reply", "list_reply": {"id": "l1", "title": "Cambio de productos"}}
        }));
        assert_eq!(get_message_text(&list_reply), "Cambio de productos");

        let image = message(serde_json::json!({
            "from": "573001234567", "id": "wamid.5", "type": "image",
            "image": {"id": "media-1"}
        }));
        assert_eq!(get_message_text(&image), "");
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let header = sign(b"app-secret", body).unwrap();
        assert!(header.starts_with("sha256="));
        verify_signature(b"app-secret", body, Some(&header)).unwrap();
    }

    #[test]
    fn signature_failures_are_distinguished() {
        let body = b"{}";
        let header = sign(b"app-secret", body).unwrap();

        let wrong_secret = verify_signature(b"other", body, Some(&header)).unwrap_err();
        assert_eq!(wrong_secret.code(), "INVALID_SIGNATURE");

        let tampered = verify_signature(b"app-secret", b"{ }", Some(&header)).unwrap_err();
        assert_eq!(tampered.code(), "INVALID_SIGNATURE");

        for bad in [None, Some("abc"), Some("sha256=zz"), Some("sha1=00")] {
            let err = verify_signature(b"app-secret", body, bad).unwrap_err();
            assert_eq!(err.code(), "MISSING_SIGNATURE", "header {bad:?}");
        }
    }

    #[test]
    fn parses_status_callbacks() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {"display_phone_number": "15550000000", "phone_number_id": "1055"},
                        "statuses": [{
                            "id": "wamid.OUT", "status": "read",
                            "timestamp": "1767225600", "recipient_id": "573001234567"
                        }]
                    }
                }]
            }]
        }))
        .unwrap();
        let status = &payload.entry[0].changes[0].value.statuses[0];
        assert_eq!(status.status, "read");
        assert_eq!(
            status.occurred_at().unwrap().to_rfc3339(),
            "2026-01-01T00:00:00+00:00"
        );
        assert!(payload.entry[0].changes[0].value.messages.is_empty());
    }
}
