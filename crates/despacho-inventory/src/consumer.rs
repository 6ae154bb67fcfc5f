// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order lifecycle events to ledger transitions.

use std::sync::Arc;

use async_trait::async_trait;
use despacho_core::inventory::{OrderLifecycleEvent, StockOperation};
use despacho_core::{Delivery, DeliveryHandler};
use tracing::{debug, error, info, warn};

use crate::orchestrator::InventoryOrchestrator;

/// Stock operation triggered by an order event type, if any.
pub fn operation_for(event_type: &str) -> Option<StockOperation> {
    match event_type {
        "order.created" => Some(StockOperation::Reserve),
        "order.paid" | "order.shipped" | "order.completed" => Some(StockOperation::ConfirmSale),
        "order.cancelled" => Some(StockOperation::Release),
        "order.refunded" => Some(StockOperation::Return),
        _ => None,
    }
}

/// [`DeliveryHandler`] for the orders queue.
///
/// Acks every event the orchestrator handled, including per-item and domain
/// failures. Transport failures requeue; payloads that do not decode are
/// rejected so they cannot loop.
pub struct OrderEventHandler {
    orchestrator: Arc<InventoryOrchestrator>,
}

impl OrderEventHandler {
    pub fn new(orchestrator: Arc<InventoryOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl DeliveryHandler for OrderEventHandler {
    fn name(&self) -> &str {
        "orders"
    }

    async fn handle(&self, routing_key: &str, payload: &[u8]) -> Delivery {
        let event: OrderLifecycleEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(routing_key, error = %e, "undecodable order event, rejecting");
                return Delivery::Reject;
            }
        };

        let Some(operation) = operation_for(&event.event_type) else {
            debug!(event_type = %event.event_type, order_id = %event.order_id, "order event ignored");
            return Delivery::Ack;
        };
        if operation == StockOperation::Reserve && event.items.is_empty() {
            debug!(order_id = %event.order_id, "order created without items, nothing to reserve");
            return Delivery::Ack;
        }

        let request = event.to_request();
        let result = match operation {
            StockOperation::Reserve => self.orchestrator.reserve_stock_for_order(&request).await,
            StockOperation::ConfirmSale => self.orchestrator.confirm_sale_for_order(&request).await,
            StockOperation::Release => self.orchestrator.release_stock_for_order(&request).await,
            StockOperation::Return => self.orchestrator.return_stock_for_order(&request).await,
        };

        match result {
            Ok(result) => {
                info!(
                    event_type = %event.event_type,
                    order_id = %event.order_id,
                    success = result.success,
                    "order event processed"
                );
                Delivery::Ack
            }
            Err(e) if e.is_transport() => {
                warn!(order_id = %event.order_id, error = %e, "order event failed, requeueing");
                Delivery::Requeue
            }
            Err(e) => {
                warn!(order_id = %event.order_id, code = e.code(), error = %e, "order event failed");
                Delivery::Ack
            }
        }
    }
}
