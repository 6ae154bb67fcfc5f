// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory entities, ledger requests, and order-level stock results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Stock counters of one product at one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub location_id: Option<i64>,
    pub business_id: i64,
    pub quantity: i64,
    pub reserved_qty: i64,
    pub available_qty: i64,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub reorder_point: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Closed set of ledger movement codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Inbound,
    Outbound,
    Adjustment,
    Transfer,
    Reserve,
    ConfirmSale,
    Release,
    Return,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::Inbound,
        MovementType::Outbound,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Reserve,
        MovementType::ConfirmSale,
        MovementType::Release,
        MovementType::Return,
    ];

    /// Sign the movement applies to on-hand quantity: `1`, `-1`, or `0` for
    /// neutral and two-sided codes.
    pub fn direction(self) -> i8 {
        match self {
            MovementType::Inbound | MovementType::Return => 1,
            MovementType::Outbound | MovementType::ConfirmSale => -1,
            MovementType::Adjustment
            | MovementType::Transfer
            | MovementType::Reserve
            | MovementType::Release => 0,
        }
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub business_id: i64,
    pub movement_type_id: i64,
    pub movement_type: MovementType,
    /// Signed change to on-hand units. For reserve and release, the units
    /// reserved or freed; `previous_qty` and `new_qty` are then equal.
    pub quantity: i64,
    pub previous_qty: i64,
    pub new_qty: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input of a single-level ledger transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRequest {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub business_id: i64,
    /// Units to move. Signed for adjustments, positive for everything else.
    pub quantity: i64,
    pub movement_type: MovementType,
    pub order_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl LedgerRequest {
    pub fn new(
        product_id: i64,
        warehouse_id: i64,
        business_id: i64,
        quantity: i64,
        movement_type: MovementType,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            business_id,
            quantity,
            movement_type,
            order_id: None,
            reason: None,
            notes: None,
        }
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Result of a committed ledger transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub level: InventoryLevel,
    /// Units actually applied (for release and confirm, the reserved units freed).
    pub applied: i64,
    pub movement_id: i64,
    /// The order had already applied this movement; counters were not touched.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveOutcome {
    pub level: InventoryLevel,
    pub reserved: i64,
    pub sufficient: bool,
    pub movement_id: i64,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub product_id: i64,
    pub business_id: i64,
    pub from_warehouse_id: i64,
    pub to_warehouse_id: i64,
    pub quantity: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub from: InventoryLevel,
    pub to: InventoryLevel,
    /// Shared `reference_id` of the two `transfer` movements.
    pub reference_id: String,
}

/// Catalog projection of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub business_id: i64,
    pub name: String,
    pub sku: String,
    pub tracks_inventory: bool,
    /// Aggregate on-hand quantity across warehouses.
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub business_id: i64,
    pub name: String,
    pub is_default: bool,
}

/// Link between a product and an external sales channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIntegration {
    pub product_id: i64,
    pub business_id: i64,
    pub integration_id: i64,
    pub external_product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInventoryItem {
    pub product_id: i64,
    #[serde(default)]
    pub sku: String,
    pub quantity: i64,
}

/// Order-level stock request handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStockRequest {
    pub order_id: String,
    pub business_id: i64,
    pub warehouse_id: Option<i64>,
    pub items: Vec<OrderInventoryItem>,
}

/// The four order-driven ledger transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    Reserve,
    ConfirmSale,
    Release,
    Return,
}

impl StockOperation {
    /// SSE event type emitted when the operation completes.
    pub fn event_type(self) -> &'static str {
        match self {
            StockOperation::Reserve => "inventory.reserved",
            StockOperation::ConfirmSale => "inventory.confirmed",
            StockOperation::Release => "inventory.released",
            StockOperation::Return => "inventory.returned",
        }
    }

    pub fn movement_type(self) -> MovementType {
        match self {
            StockOperation::Reserve => MovementType::Reserve,
            StockOperation::ConfirmSale => MovementType::ConfirmSale,
            StockOperation::Release => MovementType::Release,
            StockOperation::Return => MovementType::Return,
        }
    }

    /// Whether the operation changes salable stock and must be synced to
    /// external channels.
    pub fn syncs_channels(self) -> bool {
        matches!(self, StockOperation::ConfirmSale | StockOperation::Return)
    }
}

pub const INSUFFICIENT_EVENT: &str = "inventory.insufficient";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStockResult {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub requested: i64,
    pub processed: i64,
    pub sufficient: bool,
    /// Empty on success.
    pub error_message: String,
}

impl ItemStockResult {
    pub fn failed(item: &OrderInventoryItem, message: impl Into<String>) -> Self {
        Self {
            product_id: item.product_id,
            sku: item.sku.clone(),
            name: String::new(),
            requested: item.quantity,
            processed: 0,
            sufficient: false,
            error_message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_message.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStockResult {
    pub order_id: String,
    pub business_id: i64,
    pub warehouse_id: i64,
    pub operation: StockOperation,
    pub success: bool,
    pub all_sufficient: bool,
    pub items: Vec<ItemStockResult>,
}

impl OrderStockResult {
    /// Aggregate per-item results.
    pub fn aggregate(
        request: &OrderStockRequest,
        warehouse_id: i64,
        operation: StockOperation,
        items: Vec<ItemStockResult>,
    ) -> Self {
        let success = items.iter().all(ItemStockResult::is_ok);
        let all_sufficient = items.iter().all(|i| i.sufficient);
        Self {
            order_id: request.order_id.clone(),
            business_id: request.business_id,
            warehouse_id,
            operation,
            success,
            all_sufficient,
            items,
        }
    }
}

/// Order lifecycle event consumed from the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLifecycleEvent {
    pub event_type: String,
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    pub business_id: i64,
    #[serde(default)]
    pub warehouse_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<OrderInventoryItem>,
}

impl OrderLifecycleEvent {
    pub fn to_request(&self) -> OrderStockRequest {
        OrderStockRequest {
            order_id: self.order_id.clone(),
            business_id: self.business_id,
            warehouse_id: self.warehouse_id,
            items: self.items.clone(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Quantity push to one external sales channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySyncMessage {
    pub product_id: i64,
    pub external_product_id: String,
    pub integration_id: i64,
    pub business_id: i64,
    pub new_quantity: i64,
    pub warehouse_id: i64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl InventorySyncMessage {
    pub fn routing_key(&self) -> String {
        format!("sync.{}", self.integration_id)
    }
}

/// Inventory lifecycle notification for the `inventory-events` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub event_type: String,
    pub order_id: String,
    pub business_id: i64,
    pub warehouse_id: i64,
    pub timestamp: DateTime<Utc>,
    pub data: InventoryEventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEventData {
    pub result: OrderStockResult,
}

impl InventoryEvent {
    pub fn from_result(
        event_type: impl Into<String>,
        result: &OrderStockResult,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            order_id: result.order_id.clone(),
            business_id: result.business_id,
            warehouse_id: result.warehouse_id,
            timestamp,
            data: InventoryEventData {
                result: result.clone(),
            },
        }
    }
}

pub const INVENTORY_EVENTS_CHANNEL: &str = "inventory-events";

/// Cache key for the product-level view.
pub fn product_cache_key(product_id: i64, business_id: i64) -> String {
    format!("inventory:product:{product_id}:{business_id}")
}

/// Cache key for a single level.
pub fn level_cache_key(product_id: i64, warehouse_id: i64) -> String {
    format!("inventory:level:{product_id}:{warehouse_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_codes_match_storage_names() {
        assert_eq!(MovementType::ConfirmSale.to_string(), "confirm_sale");
        assert_eq!("return".parse::<MovementType>().unwrap(), MovementType::Return);
        assert_eq!(MovementType::ALL.len(), 8);
    }

    #[test]
    fn lifecycle_event_accepts_numeric_order_id() {
        let event: OrderLifecycleEvent = serde_json::from_str(
            r#"{"event_type":"order.created","order_id":42,"business_id":7,
                "items":[{"product_id":1,"sku":"A-1","quantity":3}]}"#,
        )
        .unwrap();
        assert_eq!(event.order_id, "42");
        assert_eq!(event.warehouse_id, None);
        assert_eq!(event.items[0].quantity, 3);
    }

    #[test]
    fn aggregate_tracks_errors_and_shortfalls() {
        let request = OrderStockRequest {
            order_id: "ORD-1".into(),
            business_id: 1,
            warehouse_id: None,
            items: vec![],
        };
        let ok = ItemStockResult {
            product_id: 1,
            sku: "A".into(),
            name: "Camisa".into(),
            requested: 5,
            processed: 2,
            sufficient: false,
            error_message: String::new(),
        };
        let result =
            OrderStockResult::aggregate(&request, 3, StockOperation::Reserve, vec![ok.clone()]);
        assert!(result.success);
        assert!(!result.all_sufficient);

        let missing = ItemStockResult::failed(
            &OrderInventoryItem {
                product_id: 9,
                sku: "Z".into(),
                quantity: 1,
            },
            "product not found",
        );
        let result =
            OrderStockResult::aggregate(&request, 3, StockOperation::Reserve, vec![ok, missing]);
        assert!(!result.success);
    }

    #[test]
    fn cache_keys() {
        assert_eq!(product_cache_key(5, 2), "inventory:product:5:2");
        assert_eq!(level_cache_key(5, 9), "inventory:level:5:9");
    }
}
