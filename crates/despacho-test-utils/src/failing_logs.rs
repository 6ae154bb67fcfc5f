// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`MessageLogStore`] that fails status updates for chosen ids.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use despacho_core::conversation::{MessageLog, MessageStatus};
use despacho_core::{DespachoError, MessageLogStore};

/// Delegates to an inner store, except that `update_status` returns a
/// storage error for every message id in the failing set.
pub struct FailingMessageLogs {
    inner: Arc<dyn MessageLogStore>,
    failing: HashSet<String>,
}

impl FailingMessageLogs {
    pub fn new(inner: Arc<dyn MessageLogStore>) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
        }
    }

    pub fn failing_on(mut self, message_id: impl Into<String>) -> Self {
        self.failing.insert(message_id.into());
        self
    }
}

#[async_trait]
impl MessageLogStore for FailingMessageLogs {
    async fn insert(&self, log: &MessageLog) -> Result<bool, DespachoError> {
        self.inner.insert(log).await
    }

    async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DespachoError> {
        if self.failing.contains(message_id) {
            return Err(DespachoError::storage(std::io::Error::other(
                "message log unavailable",
            )));
        }
        self.inner.update_status(message_id, status, at).await
    }

    async fn get_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<MessageLog>, DespachoError> {
        self.inner.get_by_message_id(message_id).await
    }

    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageLog>, DespachoError> {
        self.inner.list_for_conversation(conversation_id).await
    }
}
