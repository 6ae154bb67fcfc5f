// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publishers that capture events for assertions.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use despacho_core::conversation::ConversationEvent;
use despacho_core::inventory::{InventoryEvent, InventorySyncMessage};
use despacho_core::{
    ConversationEventPublisher, DespachoError, InventoryEventPublisher, SyncPublisher,
};

#[derive(Default)]
pub struct RecordingSyncPublisher {
    messages: Arc<Mutex<Vec<InventorySyncMessage>>>,
    failing: bool,
}

impl RecordingSyncPublisher {
    /// A publisher whose every publish fails with a broker error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub async fn messages(&self) -> Vec<InventorySyncMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl SyncPublisher for RecordingSyncPublisher {
    async fn publish_sync(&self, message: &InventorySyncMessage) -> Result<(), DespachoError> {
        if self.failing {
            return Err(DespachoError::broker("publisher unavailable"));
        }
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingInventoryEvents {
    events: Arc<Mutex<Vec<InventoryEvent>>>,
}

impl RecordingInventoryEvents {
    pub async fn events(&self) -> Vec<InventoryEvent> {
        self.events.lock().await.clone()
    }

    /// Event types in publish order.
    pub async fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl InventoryEventPublisher for RecordingInventoryEvents {
    async fn publish_inventory_event(&self, event: &InventoryEvent) -> Result<(), DespachoError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingConversationEvents {
    events: Arc<Mutex<Vec<ConversationEvent>>>,
}

impl RecordingConversationEvents {
    pub async fn events(&self) -> Vec<ConversationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl ConversationEventPublisher for RecordingConversationEvents {
    async fn publish_conversation_event(
        &self,
        event: &ConversationEvent,
    ) -> Result<(), DespachoError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
