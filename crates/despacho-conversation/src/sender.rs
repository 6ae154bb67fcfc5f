// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sends catalog templates and keeps the conversation log in step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use despacho_core::conversation::{Conversation, MessageLog};
use despacho_core::{ConversationStore, CredentialStore, DespachoError, MessageLogStore};
use despacho_whatsapp::templates::{self, TemplateDefinition};
use despacho_whatsapp::{TemplateMessage, WhatsAppClient, clean_phone};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state_machine;

/// Provider id of the sent message and the conversation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
    pub conversation_id: Uuid,
}

pub struct MessageSender {
    client: Arc<dyn WhatsAppClient>,
    conversations: Arc<dyn ConversationStore>,
    logs: Arc<dyn MessageLogStore>,
    credentials: Arc<dyn CredentialStore>,
    ttl: Duration,
}

impl MessageSender {
    pub fn new(
        client: Arc<dyn WhatsAppClient>,
        conversations: Arc<dyn ConversationStore>,
        logs: Arc<dyn MessageLogStore>,
        credentials: Arc<dyn CredentialStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            conversations,
            logs,
            credentials,
            ttl,
        }
    }

    /// Send `template_name` to `phone` for an order, starting the
    /// conversation if the phone has none active for that order.
    ///
    /// `vars` maps positions `"1"..="N"` to values.
    pub async fn send_template(
        &self,
        template_name: &str,
        phone: &str,
        vars: &HashMap<String, String>,
        order_number: &str,
        business_id: i64,
    ) -> Result<SendReceipt, DespachoError> {
        let phone = clean_phone(phone)?;
        let template = templates::get(template_name)?;
        let values = template.bind(vars)?;

        let now = Utc::now();
        let conversation = match self
            .conversations
            .find_active(&phone, order_number, now)
            .await?
        {
            Some(conversation) => conversation,
            None => {
                let mut fresh = Conversation::new(
                    phone.clone(),
                    order_number,
                    business_id,
                    state_machine::initial_state(),
                    now,
                    self.ttl,
                );
                for (name, value) in template.named_values(&values) {
                    fresh.metadata.insert(name.to_string(), Value::String(value));
                }
                let stored = self.conversations.upsert(&fresh).await?;
                info!(
                    conversation_id = %stored.id,
                    order_number,
                    business_id,
                    "conversation started"
                );
                stored
            }
        };

        self.deliver(&conversation, template, values).await
    }

    /// Send `template_name` inside an existing conversation.
    pub async fn send_template_with_conversation(
        &self,
        template_name: &str,
        vars: &HashMap<String, String>,
        conversation_id: Uuid,
    ) -> Result<SendReceipt, DespachoError> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(DespachoError::ConversationNotFound(conversation_id))?;
        if conversation.is_expired(Utc::now()) {
            return Err(DespachoError::ConversationExpired(conversation_id));
        }
        let template = templates::get(template_name)?;
        let values = template.bind(vars)?;
        self.deliver(&conversation, template, values).await
    }

    async fn deliver(
        &self,
        conversation: &Conversation,
        template: &'static TemplateDefinition,
        values: Vec<String>,
    ) -> Result<SendReceipt, DespachoError> {
        let credentials = self
            .credentials
            .whatsapp_credentials(conversation.business_id)
            .await?;
        let content = (!values.is_empty()).then(|| values.join(" | "));
        let message = TemplateMessage::new(conversation.phone_number.clone(), template, values);
        let message_id = self.client.send_template(&credentials, &message).await?;

        // The message already left; log failures must not surface as send failures.
        let log = MessageLog::outbound(
            conversation.id,
            message_id.clone(),
            template.name,
            content,
            Utc::now(),
        );
        match self.logs.insert(&log).await {
            Ok(true) => {}
            Ok(false) => debug!(%message_id, "outbound log already recorded"),
            Err(e) => warn!(%message_id, error = %e, "failed to record outbound message"),
        }
        if let Err(e) = self
            .conversations
            .record_outbound(conversation.id, &message_id, template.name)
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "failed to update last message");
        }

        debug!(
            conversation_id = %conversation.id,
            template = template.name,
            %message_id,
            "template sent"
        );
        Ok(SendReceipt {
            message_id,
            conversation_id: conversation.id,
        })
    }
}

/// Bind a template's variables from an existing conversation.
///
/// `numero_orden` comes from the order number; every other name is looked
/// up in the conversation metadata.
pub fn vars_from_conversation(
    variables: &[&str],
    conversation: &Conversation,
) -> HashMap<String, String> {
    variables
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let value = if *name == "numero_orden" {
                Some(conversation.order_number.clone())
            } else {
                conversation
                    .metadata
                    .get(*name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            value.map(|v| ((i + 1).to_string(), v))
        })
        .collect()
}
