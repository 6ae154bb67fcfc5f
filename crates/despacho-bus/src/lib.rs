// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process bus behind the `inventory-events` channel.
//!
//! Publishing never blocks and never fails for lack of listeners. Each SSE
//! client holds its own [`Subscription`], optionally scoped to one business.

use std::sync::Arc;

use async_trait::async_trait;
use despacho_core::inventory::{INVENTORY_EVENTS_CHANNEL, InventoryEvent};
use despacho_core::{DespachoError, InventoryEventPublisher};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Events a slow subscriber may fall behind before it starts losing them.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<Arc<InventoryEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Listen for events of one business, or all of them with `None`.
    pub fn subscribe(&self, business_id: Option<i64>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            business_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: InventoryEvent) -> usize {
        match self.sender.send(Arc::new(event)) {
            Ok(receivers) => receivers,
            // No subscribers.
            Err(_) => 0,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl InventoryEventPublisher for EventBus {
    async fn publish_inventory_event(&self, event: &InventoryEvent) -> Result<(), DespachoError> {
        let receivers = self.publish(event.clone());
        debug!(
            channel = INVENTORY_EVENTS_CHANNEL,
            event_type = %event.event_type,
            receivers,
            "inventory event published"
        );
        Ok(())
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<Arc<InventoryEvent>>,
    business_id: Option<i64>,
}

impl Subscription {
    /// Next matching event, or `None` once the bus is gone. Events dropped
    /// because this subscriber lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<Arc<InventoryEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.business_id.is_none_or(|id| id == event.business_id) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "inventory event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use despacho_core::inventory::{InventoryEventData, OrderStockResult, StockOperation};

    fn event(business_id: i64, order_id: &str) -> InventoryEvent {
        InventoryEvent {
            event_type: "inventory.reserved".into(),
            order_id: order_id.into(),
            business_id,
            warehouse_id: 1,
            timestamp: Utc::now(),
            data: InventoryEventData {
                result: OrderStockResult {
                    order_id: order_id.into(),
                    business_id,
                    warehouse_id: 1,
                    operation: StockOperation::Reserve,
                    success: true,
                    all_sufficient: true,
                    items: vec![],
                },
            },
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(event(1, "A")), 0);
        bus.publish_inventory_event(&event(1, "B")).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_filters_by_business() {
        let bus = EventBus::default();
        let mut scoped = bus.subscribe(Some(2));
        let mut all = bus.subscribe(None);
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(event(1, "A"));
        bus.publish(event(2, "B"));

        assert_eq!(all.recv().await.unwrap().order_id, "A");
        assert_eq!(all.recv().await.unwrap().order_id, "B");
        assert_eq!(scoped.recv().await.unwrap().order_id, "B");
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(None);
        for n in 0..5 {
            bus.publish(event(1, &format!("O{n}")));
        }
        assert_eq!(sub.recv().await.unwrap().order_id, "O3");
        assert_eq!(sub.recv().await.unwrap().order_id, "O4");
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(None);
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
