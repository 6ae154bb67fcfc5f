// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound event publishers.
//!
//! Callers treat every publish as best-effort: errors are logged and never
//! roll back the change that produced the event.

use async_trait::async_trait;

use crate::conversation::ConversationEvent;
use crate::error::DespachoError;
use crate::inventory::{InventoryEvent, InventorySyncMessage};

/// Pushes quantity updates to external sales channels.
#[async_trait]
pub trait SyncPublisher: Send + Sync {
    async fn publish_sync(&self, message: &InventorySyncMessage) -> Result<(), DespachoError>;
}

/// Emits inventory lifecycle events on the `inventory-events` channel.
#[async_trait]
pub trait InventoryEventPublisher: Send + Sync {
    async fn publish_inventory_event(&self, event: &InventoryEvent) -> Result<(), DespachoError>;
}

/// Emits business events raised by customer replies.
#[async_trait]
pub trait ConversationEventPublisher: Send + Sync {
    async fn publish_conversation_event(
        &self,
        event: &ConversationEvent,
    ) -> Result<(), DespachoError>;
}
