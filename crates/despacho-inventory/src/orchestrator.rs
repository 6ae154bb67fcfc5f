// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order-level stock operations and their side effects.
//!
//! An order operation resolves its warehouse, applies one ledger transition
//! per item in order, then fans out: product totals are recomputed, linked
//! sales channels receive the new aggregate quantity, and an
//! [`InventoryEvent`] is emitted. Only the ledger writes are critical;
//! every side effect is logged and swallowed on failure.

use std::sync::Arc;

use chrono::Utc;
use despacho_core::inventory::{
    INSUFFICIENT_EVENT, InventoryEvent, InventorySyncMessage, ItemStockResult, LedgerOutcome,
    LedgerRequest, OrderInventoryItem, OrderStockRequest, OrderStockResult, StockOperation,
    TransferOutcome, TransferRequest,
};
use despacho_core::{
    CatalogRepository, CredentialStore, DespachoError, InventoryEventPublisher, StockLedger,
    SyncPublisher,
};
use tracing::{debug, info, warn};

pub const DEFAULT_SYNC_SOURCE: &str = "despacho";

pub struct InventoryOrchestrator {
    ledger: Arc<dyn StockLedger>,
    catalog: Arc<dyn CatalogRepository>,
    credentials: Arc<dyn CredentialStore>,
    sync: Arc<dyn SyncPublisher>,
    events: Arc<dyn InventoryEventPublisher>,
    sync_source: String,
}

impl InventoryOrchestrator {
    pub fn new(
        ledger: Arc<dyn StockLedger>,
        catalog: Arc<dyn CatalogRepository>,
        credentials: Arc<dyn CredentialStore>,
        sync: Arc<dyn SyncPublisher>,
        events: Arc<dyn InventoryEventPublisher>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            credentials,
            sync,
            events,
            sync_source: DEFAULT_SYNC_SOURCE.to_string(),
        }
    }

    /// Value of the `source` field on outgoing sync messages.
    pub fn with_sync_source(mut self, source: impl Into<String>) -> Self {
        self.sync_source = source.into();
        self
    }

    /// Reserve up to the requested units of every item. Shortfalls are
    /// reported per item and raise an `inventory.insufficient` event.
    pub async fn reserve_stock_for_order(
        &self,
        request: &OrderStockRequest,
    ) -> Result<OrderStockResult, DespachoError> {
        self.process_order(StockOperation::Reserve, request).await
    }

    pub async fn confirm_sale_for_order(
        &self,
        request: &OrderStockRequest,
    ) -> Result<OrderStockResult, DespachoError> {
        self.process_order(StockOperation::ConfirmSale, request).await
    }

    pub async fn release_stock_for_order(
        &self,
        request: &OrderStockRequest,
    ) -> Result<OrderStockResult, DespachoError> {
        self.process_order(StockOperation::Release, request).await
    }

    pub async fn return_stock_for_order(
        &self,
        request: &OrderStockRequest,
    ) -> Result<OrderStockResult, DespachoError> {
        self.process_order(StockOperation::Return, request).await
    }

    /// Apply a manual adjustment to one level, then recompute and sync.
    pub async fn adjust_stock(
        &self,
        request: &LedgerRequest,
    ) -> Result<LedgerOutcome, DespachoError> {
        let outcome = match self.ledger.adjust(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                despacho_prometheus::record_ledger_operation("adjust", "error");
                return Err(e);
            }
        };
        despacho_prometheus::record_ledger_operation("adjust", "ok");
        info!(
            product_id = request.product_id,
            warehouse_id = request.warehouse_id,
            delta = request.quantity,
            quantity = outcome.level.quantity,
            "stock adjusted"
        );

        if let Some(total) = self
            .recompute_total(request.product_id, request.business_id)
            .await
        {
            self.fan_out_sync(
                request.product_id,
                request.business_id,
                request.warehouse_id,
                total,
            )
            .await;
        }
        Ok(outcome)
    }

    /// Move units between two warehouses, then recompute and sync both sides.
    pub async fn transfer_stock(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, DespachoError> {
        let outcome = match self.ledger.transfer(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                despacho_prometheus::record_ledger_operation("transfer", "error");
                return Err(e);
            }
        };
        despacho_prometheus::record_ledger_operation("transfer", "ok");
        info!(
            product_id = request.product_id,
            from = request.from_warehouse_id,
            to = request.to_warehouse_id,
            quantity = request.quantity,
            reference = %outcome.reference_id,
            "stock transferred"
        );

        if let Some(total) = self
            .recompute_total(request.product_id, request.business_id)
            .await
        {
            for warehouse_id in [request.from_warehouse_id, request.to_warehouse_id] {
                self.fan_out_sync(request.product_id, request.business_id, warehouse_id, total)
                    .await;
            }
        }
        Ok(outcome)
    }

    async fn process_order(
        &self,
        operation: StockOperation,
        request: &OrderStockRequest,
    ) -> Result<OrderStockResult, DespachoError> {
        let warehouse_id = self.resolve_warehouse(request).await?;

        let lines = merge_lines(&request.items);
        let mut items = Vec::with_capacity(lines.len());
        for item in &lines {
            let result = match self.process_item(operation, request, warehouse_id, item).await {
                Ok(result) => result,
                Err(e) => {
                    despacho_prometheus::record_ledger_operation(&operation.to_string(), "error");
                    return Err(e);
                }
            };
            items.push(result);
        }

        let result = OrderStockResult::aggregate(request, warehouse_id, operation, items);
        let outcome = if !result.success {
            "item_error"
        } else if !result.all_sufficient {
            "insufficient"
        } else {
            "ok"
        };
        despacho_prometheus::record_ledger_operation(&operation.to_string(), outcome);
        info!(
            order_id = %request.order_id,
            business_id = request.business_id,
            warehouse_id,
            operation = %operation,
            success = result.success,
            all_sufficient = result.all_sufficient,
            items = result.items.len(),
            "order stock operation applied"
        );

        let now = Utc::now();
        self.publish_event(InventoryEvent::from_result(operation.event_type(), &result, now))
            .await;
        if operation == StockOperation::Reserve && !result.all_sufficient {
            self.publish_event(InventoryEvent::from_result(INSUFFICIENT_EVENT, &result, now))
                .await;
        }
        Ok(result)
    }

    async fn resolve_warehouse(&self, request: &OrderStockRequest) -> Result<i64, DespachoError> {
        if let Some(id) = request.warehouse_id {
            return Ok(id);
        }
        self.credentials
            .default_warehouse(request.business_id)
            .await?
            .ok_or(DespachoError::NoDefaultWarehouse(request.business_id))
    }

    /// Apply one item. Domain errors land in the item's `error_message`;
    /// transport errors abort the whole order.
    async fn process_item(
        &self,
        operation: StockOperation,
        request: &OrderStockRequest,
        warehouse_id: i64,
        item: &OrderInventoryItem,
    ) -> Result<ItemStockResult, DespachoError> {
        let Some(product) = self
            .catalog
            .product(item.product_id, request.business_id)
            .await?
        else {
            warn!(order_id = %request.order_id, product_id = item.product_id, "product not found");
            return Ok(ItemStockResult::failed(item, "product not found"));
        };

        let sku = if item.sku.is_empty() {
            product.sku.clone()
        } else {
            item.sku.clone()
        };
        let mut result = ItemStockResult {
            product_id: item.product_id,
            sku,
            name: product.name.clone(),
            requested: item.quantity,
            processed: 0,
            sufficient: false,
            error_message: String::new(),
        };

        if !product.tracks_inventory {
            debug!(product_id = product.id, "product does not track inventory, skipping");
            result.processed = item.quantity;
            result.sufficient = true;
            return Ok(result);
        }

        let ledger_request = LedgerRequest::new(
            item.product_id,
            warehouse_id,
            request.business_id,
            item.quantity,
            operation.movement_type(),
        )
        .with_order(request.order_id.clone());

        let applied = match operation {
            StockOperation::Reserve => self.ledger.reserve(&ledger_request).await.map(|o| {
                result.sufficient = o.sufficient;
                o.reserved
            }),
            StockOperation::ConfirmSale => self
                .ledger
                .confirm_sale(&ledger_request)
                .await
                .map(|_| item.quantity),
            StockOperation::Release => self.ledger.release(&ledger_request).await.map(|o| o.applied),
            StockOperation::Return => self
                .ledger
                .return_stock(&ledger_request)
                .await
                .map(|_| item.quantity),
        };

        match applied {
            Ok(processed) => {
                result.processed = processed;
                if operation != StockOperation::Reserve {
                    result.sufficient = true;
                }
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!(
                    order_id = %request.order_id,
                    product_id = item.product_id,
                    code = e.code(),
                    error = %e,
                    "order item failed"
                );
                result.error_message = e.to_string();
                return Ok(result);
            }
        }

        let total = self.recompute_total(product.id, request.business_id).await;
        if let (Some(total), true) = (total, operation.syncs_channels()) {
            self.fan_out_sync(product.id, request.business_id, warehouse_id, total)
                .await;
        }
        Ok(result)
    }

    async fn recompute_total(&self, product_id: i64, business_id: i64) -> Option<i64> {
        match self
            .catalog
            .recompute_product_stock(product_id, business_id)
            .await
        {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(product_id, business_id, error = %e, "product stock recompute failed (non-fatal)");
                None
            }
        }
    }

    async fn fan_out_sync(
        &self,
        product_id: i64,
        business_id: i64,
        warehouse_id: i64,
        new_quantity: i64,
    ) {
        let integrations = match self
            .catalog
            .integrations_for_product(product_id, business_id)
            .await
        {
            Ok(integrations) => integrations,
            Err(e) => {
                warn!(product_id, error = %e, "integration lookup failed, sync skipped (non-fatal)");
                return;
            }
        };

        for integration in integrations {
            let message = InventorySyncMessage {
                product_id,
                external_product_id: integration.external_product_id,
                integration_id: integration.integration_id,
                business_id,
                new_quantity,
                warehouse_id,
                source: self.sync_source.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.sync.publish_sync(&message).await {
                warn!(
                    product_id,
                    integration_id = message.integration_id,
                    error = %e,
                    "inventory sync publish failed (non-fatal)"
                );
            }
        }
    }

    async fn publish_event(&self, event: InventoryEvent) {
        if let Err(e) = self.events.publish_inventory_event(&event).await {
            warn!(
                event_type = %event.event_type,
                order_id = %event.order_id,
                error = %e,
                "inventory event publish failed (non-fatal)"
            );
        }
    }
}

/// One line per product with quantities summed, in first-seen order.
///
/// The ledger applies an order's movement once per level, so repeated lines
/// for a product must reach it as a single request.
fn merge_lines(items: &[OrderInventoryItem]) -> Vec<OrderInventoryItem> {
    let mut merged: Vec<OrderInventoryItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => merged.push(item.clone()),
        }
    }
    merged
}
