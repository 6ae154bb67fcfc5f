// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and message-log persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conversation::{Conversation, MessageLog, MessageStatus, StateUpdate};
use crate::error::DespachoError;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert `conversation`, or revive the row already stored for its
    /// `(phone_number, order_number)` with the given state and expiry.
    /// Any other active conversation for the same phone is expired.
    ///
    /// Returns the stored row, whose id may differ from `conversation.id`.
    async fn upsert(&self, conversation: &Conversation) -> Result<Conversation, DespachoError>;

    async fn get(&self, id: Uuid) -> Result<Option<Conversation>, DespachoError>;

    /// The active conversation for a phone and order, if any.
    async fn find_active(
        &self,
        phone_number: &str,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, DespachoError>;

    /// Most recently updated non-terminal conversation for a phone, expired
    /// or not. Callers decide what to do with an expired one.
    async fn find_open_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Conversation>, DespachoError>;

    /// Apply a state change if nobody else changed the row first.
    /// Fails with `STALE_CONVERSATION` otherwise.
    async fn update_state(&self, update: &StateUpdate) -> Result<Conversation, DespachoError>;

    /// Record the last outbound message without touching `updated_at`.
    async fn record_outbound(
        &self,
        id: Uuid,
        message_id: &str,
        template_name: &str,
    ) -> Result<(), DespachoError>;

    async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, DespachoError>;

    /// Non-terminal conversations whose expiry fell in `(since, until]`.
    async fn count_expired_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<i64, DespachoError>;
}

#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Returns `false` when a log with the same provider `message_id` exists.
    async fn insert(&self, log: &MessageLog) -> Result<bool, DespachoError>;

    /// Advance the status of a log. Returns `false` when the log is unknown
    /// or the change would move the status backwards.
    async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DespachoError>;

    async fn get_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<MessageLog>, DespachoError>;

    /// Logs of one conversation, oldest first.
    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageLog>, DespachoError>;
}
