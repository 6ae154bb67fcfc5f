// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `despacho-core`.
//!
//! Timestamps are stored as fixed-width RFC 3339 text with millisecond
//! precision, so lexicographic order in SQL matches chronological order.
//! UUIDs are stored as hyphenated text, metadata as a JSON object.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

pub use despacho_core::conversation::{
    Conversation, ConversationState, MessageDirection, MessageLog, MessageStatus,
};
pub use despacho_core::inventory::{
    InventoryLevel, MovementType, Product, ProductIntegration, StockMovement, Warehouse,
};

/// Format a timestamp for storage.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate to the stored precision so values compare equal after a round trip.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

pub(crate) fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) const CONVERSATION_COLUMNS: &str = "id, phone_number, order_number, business_id, \
     current_state, last_message_id, last_template_id, metadata, created_at, updated_at, expires_at";

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let metadata: String = row.get(7)?;
    let metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&metadata).map_err(|e| conversion_err(7, e))?;
    Ok(Conversation {
        id: get_uuid(row, 0)?,
        phone_number: row.get(1)?,
        order_number: row.get(2)?,
        business_id: row.get(3)?,
        current_state: get_enum(row, 4)?,
        last_message_id: row.get(5)?,
        last_template_id: row.get(6)?,
        metadata,
        created_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
        expires_at: get_ts(row, 10)?,
    })
}

pub(crate) const MESSAGE_LOG_COLUMNS: &str = "id, conversation_id, direction, message_id, \
     template_name, content, status, delivered_at, read_at, created_at";

pub(crate) fn message_log_from_row(row: &Row<'_>) -> rusqlite::Result<MessageLog> {
    Ok(MessageLog {
        id: get_uuid(row, 0)?,
        conversation_id: get_uuid(row, 1)?,
        direction: get_enum::<MessageDirection>(row, 2)?,
        message_id: row.get(3)?,
        template_name: row.get(4)?,
        content: row.get(5)?,
        status: get_enum::<MessageStatus>(row, 6)?,
        delivered_at: get_opt_ts(row, 7)?,
        read_at: get_opt_ts(row, 8)?,
        created_at: get_ts(row, 9)?,
    })
}

pub(crate) const LEVEL_COLUMNS: &str = "id, product_id, warehouse_id, location_id, business_id, \
     quantity, reserved_qty, available_qty, min_stock, max_stock, reorder_point, updated_at";

pub(crate) fn level_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryLevel> {
    Ok(InventoryLevel {
        id: row.get(0)?,
        product_id: row.get(1)?,
        warehouse_id: row.get(2)?,
        location_id: row.get(3)?,
        business_id: row.get(4)?,
        quantity: row.get(5)?,
        reserved_qty: row.get(6)?,
        available_qty: row.get(7)?,
        min_stock: row.get(8)?,
        max_stock: row.get(9)?,
        reorder_point: row.get(10)?,
        updated_at: get_ts(row, 11)?,
    })
}

pub(crate) const MOVEMENT_SELECT: &str = "SELECT m.id, m.product_id, m.warehouse_id, \
     m.business_id, m.movement_type_id, t.code, m.quantity, m.previous_qty, m.new_qty, \
     m.reference_type, m.reference_id, m.reason, m.notes, m.created_at \
     FROM stock_movements m JOIN movement_types t ON t.id = m.movement_type_id";

pub(crate) fn movement_from_row(row: &Row<'_>) -> rusqlite::Result<StockMovement> {
    Ok(StockMovement {
        id: row.get(0)?,
        product_id: row.get(1)?,
        warehouse_id: row.get(2)?,
        business_id: row.get(3)?,
        movement_type_id: row.get(4)?,
        movement_type: get_enum::<MovementType>(row, 5)?,
        quantity: row.get(6)?,
        previous_qty: row.get(7)?,
        new_qty: row.get(8)?,
        reference_type: row.get(9)?,
        reference_id: row.get(10)?,
        reason: row.get(11)?,
        notes: row.get(12)?,
        created_at: get_ts(row, 13)?,
    })
}

pub(crate) fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        sku: row.get(3)?,
        tracks_inventory: row.get(4)?,
        stock: row.get(5)?,
    })
}

pub(crate) fn warehouse_from_row(row: &Row<'_>) -> rusqlite::Result<Warehouse> {
    Ok(Warehouse {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        is_default: row.get(3)?,
    })
}
