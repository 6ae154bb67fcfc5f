// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and message-log entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// State of a WhatsApp order conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Start,
    AwaitingConfirmation,
    AwaitingMenuSelection,
    AwaitingNoveltyType,
    AwaitingCancelConfirm,
    AwaitingCancelReason,
    Completed,
    HandoffToHuman,
}

impl ConversationState {
    /// Every state, in declaration order.
    pub const ALL: [ConversationState; 8] = [
        ConversationState::Start,
        ConversationState::AwaitingConfirmation,
        ConversationState::AwaitingMenuSelection,
        ConversationState::AwaitingNoveltyType,
        ConversationState::AwaitingCancelConfirm,
        ConversationState::AwaitingCancelReason,
        ConversationState::Completed,
        ConversationState::HandoffToHuman,
    ];

    /// No further user reply is processed once a conversation is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversationState::Completed | ConversationState::HandoffToHuman
        )
    }
}

/// Durable record of one phone/order flow on WhatsApp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Cleaned digits, no `+` prefix.
    pub phone_number: String,
    pub order_number: String,
    pub business_id: i64,
    pub current_state: ConversationState,
    pub last_message_id: Option<String>,
    pub last_template_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a fresh conversation in `state`, expiring `ttl` after `now`.
    pub fn new(
        phone_number: impl Into<String>,
        order_number: impl Into<String>,
        business_id: i64,
        state: ConversationState,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            order_number: order_number.into(),
            business_id,
            current_state: state,
            last_message_id: None,
            last_template_id: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active means not expired and not in a terminal state.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.current_state.is_terminal()
    }
}

/// An optimistic state change: applies only if `updated_at` still equals
/// `expected_updated_at`.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub conversation_id: Uuid,
    pub expected_updated_at: DateTime<Utc>,
    pub next_state: ConversationState,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Delivery status of a message at the provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Parse the lowercase status names used by webhook status callbacks.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sent => 0,
            MessageStatus::Delivered => 1,
            MessageStatus::Read => 2,
            MessageStatus::Failed => 3,
        }
    }

    /// Whether a log in `self` may move to `next`.
    ///
    /// Progress is monotonic along SENT, DELIVERED, READ. FAILED is terminal
    /// and can only follow SENT or DELIVERED.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Failed, _) => false,
            (MessageStatus::Read, MessageStatus::Failed) => false,
            (_, MessageStatus::Failed) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: MessageDirection,
    /// Provider message id, globally unique.
    pub message_id: String,
    pub template_name: Option<String>,
    pub content: Option<String>,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageLog {
    pub fn inbound(
        conversation_id: Uuid,
        message_id: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            direction: MessageDirection::Inbound,
            message_id: message_id.into(),
            template_name: None,
            content: Some(content.into()),
            status: MessageStatus::Delivered,
            delivered_at: Some(now),
            read_at: None,
            created_at: now,
        }
    }

    pub fn outbound(
        conversation_id: Uuid,
        message_id: impl Into<String>,
        template_name: impl Into<String>,
        content: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            direction: MessageDirection::Outbound,
            message_id: message_id.into(),
            template_name: Some(template_name.into()),
            content,
            status: MessageStatus::Sent,
            delivered_at: None,
            read_at: None,
            created_at: now,
        }
    }
}

/// A business event raised by a customer reply, published to the order
/// lifecycle topic under `whatsapp.<event_type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// `confirmed`, `cancelled`, `novelty` or `handoff`.
    pub event_type: String,
    pub conversation_id: Uuid,
    pub order_number: String,
    pub business_id: i64,
    pub phone_number: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_names_round_trip() {
        for state in ConversationState::ALL {
            let s = state.to_string();
            assert_eq!(ConversationState::from_str(&s).unwrap(), state);
        }
        assert_eq!(
            ConversationState::AwaitingCancelReason.to_string(),
            "AWAITING_CANCEL_REASON"
        );
        let json = serde_json::to_string(&ConversationState::HandoffToHuman).unwrap();
        assert_eq!(json, "\"HANDOFF_TO_HUMAN\"");
    }

    #[test]
    fn only_completed_and_handoff_are_terminal() {
        let terminal: Vec<_> = ConversationState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![ConversationState::Completed, ConversationState::HandoffToHuman]
        );
    }

    #[test]
    fn status_progress_is_monotonic() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Failed));

        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Read.can_advance_to(Read));
        assert!(!Read.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Read));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn expired_conversation_is_not_active() {
        let now = Utc::now();
        let mut conv = Conversation::new(
            "573001234567",
            "ORD-1",
            1,
            ConversationState::AwaitingConfirmation,
            now,
            chrono::Duration::hours(24),
        );
        assert!(conv.is_active(now));

        conv.expires_at = now - chrono::Duration::seconds(1);
        assert!(conv.is_expired(now));
        assert!(!conv.is_active(now));

        conv.expires_at = now + chrono::Duration::hours(1);
        conv.current_state = ConversationState::Completed;
        assert!(!conv.is_active(now));
    }

    #[test]
    fn provider_status_names() {
        assert_eq!(MessageStatus::from_provider("read"), Some(MessageStatus::Read));
        assert_eq!(MessageStatus::from_provider("deleted"), None);
    }
}
