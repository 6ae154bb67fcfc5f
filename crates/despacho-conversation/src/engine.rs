// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Applies verified webhook payloads to conversations.
//!
//! Each inbound message runs: find the open conversation of the phone,
//! record the inbound log (a duplicate provider id ends processing), compute
//! the transition, send the next template, persist the new state guarded by
//! `updated_at`, then publish the business event. A failure on one message
//! never stops its siblings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use despacho_core::conversation::{
    ConversationEvent, ConversationState, MessageLog, MessageStatus, StateUpdate,
};
use despacho_core::{ConversationEventPublisher, ConversationStore, DespachoError, MessageLogStore};
use despacho_whatsapp::webhook::{InboundMessage, StatusUpdate};
use despacho_whatsapp::{WebhookPayload, WebhookSink, clean_phone, get_message_text};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sender::{MessageSender, vars_from_conversation};
use crate::state_machine::{self, BusinessEvent};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// The phone has no open conversation.
    Ignored,
    /// The provider redelivered a message already logged.
    Duplicate,
    Transitioned {
        conversation_id: Uuid,
        from: ConversationState,
        to: ConversationState,
        outbound_message_id: String,
        event: Option<BusinessEvent>,
    },
}

#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: String,
    pub result: Result<Handled, DespachoError>,
}

pub struct ConversationEngine {
    conversations: Arc<dyn ConversationStore>,
    logs: Arc<dyn MessageLogStore>,
    sender: Arc<MessageSender>,
    events: Arc<dyn ConversationEventPublisher>,
    ttl: Duration,
}

impl ConversationEngine {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        logs: Arc<dyn MessageLogStore>,
        sender: Arc<MessageSender>,
        events: Arc<dyn ConversationEventPublisher>,
        ttl: Duration,
    ) -> Self {
        Self {
            conversations,
            logs,
            sender,
            events,
            ttl,
        }
    }

    pub async fn handle_incoming_messages(&self, messages: &[InboundMessage]) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            despacho_prometheus::record_webhook_message("message");
            let result = self.handle_message(message).await;
            match &result {
                Ok(Handled::Ignored) => {
                    debug!(message_id = %message.id, "no open conversation for sender")
                }
                Ok(Handled::Duplicate) => {
                    debug!(message_id = %message.id, "duplicate inbound message skipped")
                }
                Ok(Handled::Transitioned { from, to, .. }) => {
                    info!(message_id = %message.id, %from, %to, "conversation advanced")
                }
                Err(e) => warn!(
                    message_id = %message.id,
                    code = e.code(),
                    error = %e,
                    "inbound message not applied"
                ),
            }
            outcomes.push(MessageOutcome {
                message_id: message.id.clone(),
                result,
            });
        }
        outcomes
    }

    async fn handle_message(&self, message: &InboundMessage) -> Result<Handled, DespachoError> {
        let phone = clean_phone(&message.from)?;
        let text = get_message_text(message);
        let now = Utc::now();

        let Some(conversation) = self.conversations.find_open_by_phone(&phone).await? else {
            return Ok(Handled::Ignored);
        };
        if conversation.is_expired(now) {
            return Err(DespachoError::ConversationExpired(conversation.id));
        }

        let inbound = MessageLog::inbound(conversation.id, message.id.clone(), text.clone(), now);
        if !self.logs.insert(&inbound).await? {
            return Ok(Handled::Duplicate);
        }

        let transition = state_machine::transition(conversation.current_state, &text)?;
        let vars = vars_from_conversation(transition.variables, &conversation);
        let receipt = self
            .sender
            .send_template_with_conversation(transition.template_name, &vars, conversation.id)
            .await?;

        let now = Utc::now();
        let updated = self
            .conversations
            .update_state(&StateUpdate {
                conversation_id: conversation.id,
                expected_updated_at: conversation.updated_at,
                next_state: transition.next_state,
                updated_at: now,
                expires_at: now + self.ttl,
            })
            .await?;

        if let Some(event_type) = transition.event_type {
            let event = ConversationEvent {
                event_type: event_type.to_string(),
                conversation_id: updated.id,
                order_number: updated.order_number.clone(),
                business_id: updated.business_id,
                phone_number: updated.phone_number.clone(),
                metadata: transition.event_metadata.clone(),
                timestamp: now,
            };
            if let Err(e) = self.events.publish_conversation_event(&event).await {
                warn!(
                    conversation_id = %updated.id,
                    event_type = %event_type,
                    error = %e,
                    "failed to publish conversation event"
                );
            }
        }

        Ok(Handled::Transitioned {
            conversation_id: updated.id,
            from: conversation.current_state,
            to: updated.current_state,
            outbound_message_id: receipt.message_id,
            event: transition.event_type,
        })
    }

    /// Apply delivery status callbacks. Returns how many changed a log.
    pub async fn handle_message_statuses(&self, statuses: &[StatusUpdate]) -> usize {
        let mut applied = 0;
        for update in statuses {
            despacho_prometheus::record_webhook_message("status");
            let Some(status) = MessageStatus::from_provider(&update.status) else {
                warn!(message_id = %update.id, status = %update.status, "unknown message status");
                continue;
            };
            let at = update.occurred_at().unwrap_or_else(Utc::now);
            match self.logs.update_status(&update.id, status, at).await {
                Ok(true) => applied += 1,
                Ok(false) => debug!(message_id = %update.id, %status, "status not applied"),
                Err(e) => {
                    warn!(message_id = %update.id, error = %e, "failed to update message status")
                }
            }
        }
        applied
    }
}

#[async_trait]
impl WebhookSink for ConversationEngine {
    async fn process(&self, payload: WebhookPayload) {
        for change in payload.entry.iter().flat_map(|e| e.changes.iter()) {
            if change.field != "messages" {
                despacho_prometheus::record_webhook_message("ignored");
                debug!(field = %change.field, "ignoring webhook change");
                continue;
            }
            if !change.value.messages.is_empty() {
                self.handle_incoming_messages(&change.value.messages).await;
            }
            if !change.value.statuses.is_empty() {
                let applied = self.handle_message_statuses(&change.value.statuses).await;
                debug!(applied, total = change.value.statuses.len(), "statuses processed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use despacho_core::conversation::Conversation;
    use despacho_test_utils::{
        FailingMessageLogs, MockWhatsAppClient, RecordingConversationEvents, StaticCredentials,
        TestStorage,
    };
    use despacho_whatsapp::templates;

    struct Harness {
        storage: TestStorage,
        client: Arc<MockWhatsAppClient>,
        events: Arc<RecordingConversationEvents>,
        engine: ConversationEngine,
    }

    async fn harness() -> Harness {
        harness_failing_status(&[]).await
    }

    /// Harness whose message log store fails status updates for `ids`.
    async fn harness_failing_status(ids: &[&str]) -> Harness {
        let storage = TestStorage::new().await;
        let logs: Arc<dyn MessageLogStore> = if ids.is_empty() {
            storage.storage.clone()
        } else {
            let failing = ids.iter().fold(
                FailingMessageLogs::new(storage.storage.clone()),
                |logs, id| logs.failing_on(*id),
            );
            Arc::new(failing)
        };
        let client = Arc::new(MockWhatsAppClient::new());
        let events = Arc::new(RecordingConversationEvents::default());
        let sender = Arc::new(MessageSender::new(
            client.clone(),
            storage.storage.clone(),
            storage.storage.clone(),
            Arc::new(StaticCredentials::for_business(1)),
            Duration::hours(24),
        ));
        let engine = ConversationEngine::new(
            storage.storage.clone(),
            logs,
            sender,
            events.clone(),
            Duration::hours(24),
        );
        Harness {
            storage,
            client,
            events,
            engine,
        }
    }

    async fn open(h: &Harness, state: ConversationState) -> Conversation {
        let conv = Conversation::new(
            "573001234567",
            "ORD-100",
            1,
            state,
            Utc::now(),
            Duration::hours(24),
        );
        h.storage.storage.upsert(&conv).await.unwrap()
    }

    fn button(id: &str, label: &str) -> InboundMessage {
        serde_json::from_value(serde_json::json!({
            "from": "573001234567", "id": id, "type": "button",
            "button": {"text": label, "payload": label}
        }))
        .unwrap()
    }

    fn text(id: &str, body: &str) -> InboundMessage {
        serde_json::from_value(serde_json::json!({
            "from": "+57 300 123 4567", "id": id, "type": "text", "text": {"body": body}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn confirm_publishes_event_and_completes() {
        let h = harness().await;
        let conv = open(&h, ConversationState::AwaitingConfirmation).await;

        let outcomes = h
            .engine
            .handle_incoming_messages(&[button("wamid.IN1", "Confirmar pedido")])
            .await;
        assert_eq!(outcomes.len(), 1);
        match outcomes[0].result.as_ref().unwrap() {
            Handled::Transitioned { to, event, .. } => {
                assert_eq!(*to, ConversationState::Completed);
                assert_eq!(*event, Some(BusinessEvent::Confirmed));
            }
            other => panic!("unexpected {other:?}"),
        }

        let sent = h.client.sent().await;
        assert_eq!(sent[0].template.name, templates::PEDIDO_CONFIRMADO);
        assert_eq!(sent[0].values(), vec!["ORD-100"]);

        let stored = h.storage.storage.get(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.current_state, ConversationState::Completed);

        let events = h.events.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "confirmed");
        assert_eq!(events[0].order_number, "ORD-100");
    }

    #[tokio::test]
    async fn redelivered_message_is_skipped() {
        let h = harness().await;
        open(&h, ConversationState::AwaitingConfirmation).await;

        let msg = button("wamid.DUP", "No confirmar");
        h.engine.handle_incoming_messages(&[msg.clone()]).await;
        let outcomes = h.engine.handle_incoming_messages(&[msg]).await;
        assert_eq!(outcomes[0].result.as_ref().unwrap(), &Handled::Duplicate);
        assert_eq!(h.client.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_reply_keeps_state_and_siblings_continue() {
        let h = harness().await;
        let conv = open(&h, ConversationState::AwaitingConfirmation).await;

        let outcomes = h
            .engine
            .handle_incoming_messages(&[text("wamid.A", "hola"), button("wamid.B", "No confirmar")])
            .await;
        assert_eq!(outcomes[0].result.as_ref().unwrap_err().code(), "INVALID_TRANSITION");
        assert!(outcomes[1].result.is_ok());

        let stored = h.storage.storage.get(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.current_state, ConversationState::AwaitingMenuSelection);
    }

    #[tokio::test]
    async fn expired_conversation_sends_nothing() {
        let h = harness().await;
        let stale = Conversation::new(
            "573001234567",
            "ORD-100",
            1,
            ConversationState::AwaitingConfirmation,
            Utc::now() - Duration::hours(25),
            Duration::hours(24),
        );
        h.storage.storage.upsert(&stale).await.unwrap();

        let outcomes = h
            .engine
            .handle_incoming_messages(&[button("wamid.X", "Confirmar pedido")])
            .await;
        assert_eq!(outcomes[0].result.as_ref().unwrap_err().code(), "CONVERSATION_EXPIRED");
        assert!(h.client.sent().await.is_empty());
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn expired_conversation_is_logged_with_code() {
        let h = harness().await;
        let stale = Conversation::new(
            "573001234567",
            "ORD-101",
            1,
            ConversationState::AwaitingConfirmation,
            Utc::now() - Duration::hours(30),
            Duration::hours(24),
        );
        h.storage.storage.upsert(&stale).await.unwrap();

        h.engine
            .handle_incoming_messages(&[button("wamid.LOG", "Confirmar pedido")])
            .await;
        assert!(logs_contain("inbound message not applied"));
        assert!(logs_contain("CONVERSATION_EXPIRED"));
    }

    #[tokio::test]
    async fn unknown_sender_is_ignored() {
        let h = harness().await;
        let outcomes = h
            .engine
            .handle_incoming_messages(&[button("wamid.Z", "Confirmar pedido")])
            .await;
        assert_eq!(outcomes[0].result.as_ref().unwrap(), &Handled::Ignored);
    }

    #[tokio::test]
    async fn send_failure_leaves_state_untouched() {
        let h = harness().await;
        let conv = open(&h, ConversationState::AwaitingConfirmation).await;
        h.client
            .fail_next(DespachoError::Timeout {
                duration: std::time::Duration::from_secs(30),
            })
            .await;

        let outcomes = h
            .engine
            .handle_incoming_messages(&[button("wamid.F", "Confirmar pedido")])
            .await;
        assert_eq!(outcomes[0].result.as_ref().unwrap_err().code(), "TIMEOUT");
        let stored = h.storage.storage.get(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.current_state, ConversationState::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn statuses_apply_independently() {
        let h = harness().await;
        let conv = open(&h, ConversationState::AwaitingConfirmation).await;
        for id in ["wamid.S1", "wamid.S2"] {
            let log = MessageLog::outbound(conv.id, id, "pedido_confirmado", None, Utc::now());
            h.storage.storage.insert(&log).await.unwrap();
        }
        let statuses: Vec<StatusUpdate> = serde_json::from_value(serde_json::json!([
            {"id": "wamid.S1", "status": "delivered", "timestamp": "1767225600"},
            {"id": "wamid.UNKNOWN", "status": "read", "timestamp": "1767225600"},
            {"id": "wamid.S2", "status": "deleted", "timestamp": "1767225600"},
            {"id": "wamid.S2", "status": "read", "timestamp": "1767225660"}
        ]))
        .unwrap();

        assert_eq!(h.engine.handle_message_statuses(&statuses).await, 2);
        let s1 = h.storage.storage.get_by_message_id("wamid.S1").await.unwrap().unwrap();
        assert_eq!(s1.status, MessageStatus::Delivered);
        let s2 = h.storage.storage.get_by_message_id("wamid.S2").await.unwrap().unwrap();
        assert_eq!(s2.status, MessageStatus::Read);
        assert!(s2.read_at.is_some());
    }

    #[tokio::test]
    async fn status_store_error_does_not_stop_siblings() {
        let h = harness_failing_status(&["wamid.BROKEN"]).await;
        let conv = open(&h, ConversationState::AwaitingConfirmation).await;
        for id in ["wamid.S1", "wamid.BROKEN", "wamid.S2"] {
            let log = MessageLog::outbound(conv.id, id, "pedido_confirmado", None, Utc::now());
            h.storage.storage.insert(&log).await.unwrap();
        }
        let statuses: Vec<StatusUpdate> = serde_json::from_value(serde_json::json!([
            {"id": "wamid.S1", "status": "delivered", "timestamp": "1767225600"},
            {"id": "wamid.BROKEN", "status": "delivered", "timestamp": "1767225600"},
            {"id": "wamid.S2", "status": "read", "timestamp": "1767225660"}
        ]))
        .unwrap();

        assert_eq!(h.engine.handle_message_statuses(&statuses).await, 2);
        let s1 = h.storage.storage.get_by_message_id("wamid.S1").await.unwrap().unwrap();
        assert_eq!(s1.status, MessageStatus::Delivered);
        let s2 = h.storage.storage.get_by_message_id("wamid.S2").await.unwrap().unwrap();
        assert_eq!(s2.status, MessageStatus::Read);
        let broken = h
            .storage
            .storage
            .get_by_message_id("wamid.BROKEN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(broken.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn non_message_fields_are_noops() {
        let h = harness().await;
        open(&h, ConversationState::AwaitingConfirmation).await;
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "W", "changes": [{"field": "account_update", "value": {
                "messages": [{"from": "573001234567", "id": "wamid.Q", "type": "button",
                              "button": {"text": "Confirmar pedido"}}]
            }}]}]
        }))
        .unwrap();
        h.engine.process(payload).await;
        assert!(h.client.sent().await.is_empty());
    }
}
