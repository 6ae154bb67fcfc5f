// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional stock ledger.
//!
//! Every mutation runs in one `BEGIN IMMEDIATE` transaction: validate the
//! product and warehouse, read (or create) the level, apply the counter
//! transition from `despacho_core::ledger`, write the level back, and append
//! the movement. A domain error anywhere rolls the whole transaction back.
//!
//! A movement that references an order is applied at most once per
//! (order, movement type, level). A repeat returns the original outcome with
//! `replayed` set and leaves the counters alone, so order events can be
//! redelivered safely.

use chrono::Utc;
use despacho_core::DespachoError;
use despacho_core::inventory::{
    InventoryLevel, LedgerOutcome, LedgerRequest, MovementType, ReserveOutcome, StockMovement,
    TransferOutcome, TransferRequest,
};
use despacho_core::ledger::{CounterError, LevelCounters};
use rusqlite::{OptionalExtension, Transaction, params};
use uuid::Uuid;

use crate::database::{Database, TxError};
use crate::models::{LEVEL_COLUMNS, MOVEMENT_SELECT, level_from_row, movement_from_row, ts};

const ORDER_REFERENCE: &str = "order";
const TRANSFER_REFERENCE: &str = "transfer";

/// Result of a counter transition, plus the signed quantity to record.
struct Step {
    counters: LevelCounters,
    applied: i64,
    movement_qty: i64,
}

type Transition = fn(LevelCounters, i64) -> Result<Step, CounterError>;

fn movement_type_id(tx: &Transaction<'_>, code: MovementType) -> Result<i64, TxError> {
    let id = tx
        .query_row(
            "SELECT id FROM movement_types WHERE code = ?1",
            params![code.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    id.ok_or_else(|| DespachoError::MovementTypeNotFound(code.to_string()).into())
}

fn check_product(tx: &Transaction<'_>, product_id: i64, business_id: i64) -> Result<(), TxError> {
    let tracks: Option<bool> = tx
        .query_row(
            "SELECT tracks_inventory FROM products WHERE id = ?1 AND business_id = ?2",
            params![product_id, business_id],
            |row| row.get(0),
        )
        .optional()?;
    match tracks {
        None => Err(DespachoError::ProductNotFound(product_id).into()),
        Some(false) => Err(DespachoError::ProductNoTracking(product_id).into()),
        Some(true) => Ok(()),
    }
}

fn check_warehouse(
    tx: &Transaction<'_>,
    warehouse_id: i64,
    business_id: i64,
) -> Result<(), TxError> {
    let found = tx
        .query_row(
            "SELECT 1 FROM warehouses WHERE id = ?1 AND business_id = ?2",
            params![warehouse_id, business_id],
            |_| Ok(()),
        )
        .optional()?;
    found.ok_or_else(|| DespachoError::WarehouseNotFound(warehouse_id).into())
}

fn select_level(
    conn: &rusqlite::Connection,
    product_id: i64,
    warehouse_id: i64,
) -> rusqlite::Result<Option<InventoryLevel>> {
    conn.query_row(
        &format!(
            "SELECT {LEVEL_COLUMNS} FROM inventory_levels WHERE product_id = ?1 AND warehouse_id = ?2"
        ),
        params![product_id, warehouse_id],
        level_from_row,
    )
    .optional()
}

/// Read the level, creating an empty one on first use.
fn level_for_update(
    tx: &Transaction<'_>,
    product_id: i64,
    warehouse_id: i64,
    business_id: i64,
    now: &str,
) -> Result<InventoryLevel, TxError> {
    if let Some(level) = select_level(tx, product_id, warehouse_id)? {
        return Ok(level);
    }
    tx.execute(
        "INSERT INTO inventory_levels
             (product_id, warehouse_id, business_id, quantity, reserved_qty, available_qty, updated_at)
         VALUES (?1, ?2, ?3, 0, 0, 0, ?4)
         ON CONFLICT (product_id, warehouse_id) DO NOTHING",
        params![product_id, warehouse_id, business_id, now],
    )?;
    select_level(tx, product_id, warehouse_id)?.ok_or_else(|| {
        DespachoError::LedgerInconsistent {
            product_id,
            warehouse_id,
            detail: "level vanished after insert".to_string(),
        }
        .into()
    })
}

fn write_level(
    tx: &Transaction<'_>,
    level: &InventoryLevel,
    counters: LevelCounters,
    now: &str,
) -> Result<InventoryLevel, TxError> {
    tx.execute(
        "UPDATE inventory_levels
         SET quantity = ?1, reserved_qty = ?2, available_qty = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            counters.quantity,
            counters.reserved_qty,
            counters.available(),
            now,
            level.id
        ],
    )?;
    Ok(select_level(tx, level.product_id, level.warehouse_id)?.ok_or_else(|| {
        DespachoError::LedgerInconsistent {
            product_id: level.product_id,
            warehouse_id: level.warehouse_id,
            detail: "level vanished after update".to_string(),
        }
    })?)
}

struct NewMovement<'a> {
    type_id: i64,
    level: &'a InventoryLevel,
    quantity: i64,
    previous_qty: i64,
    new_qty: i64,
    reference_type: Option<&'a str>,
    reference_id: Option<&'a str>,
    reason: Option<&'a str>,
    notes: Option<&'a str>,
    applied: i64,
}

fn insert_movement(tx: &Transaction<'_>, m: &NewMovement<'_>, now: &str) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO stock_movements (product_id, warehouse_id, business_id, movement_type_id,
             quantity, previous_qty, new_qty, reference_type, reference_id, reason, notes,
             created_at, applied_qty)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            m.level.product_id,
            m.level.warehouse_id,
            m.level.business_id,
            m.type_id,
            m.quantity,
            m.previous_qty,
            m.new_qty,
            m.reference_type,
            m.reference_id,
            m.reason,
            m.notes,
            now,
            m.applied,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Id and applied units of an earlier movement for the same order, type and level.
fn prior_order_movement(
    tx: &Transaction<'_>,
    type_id: i64,
    request: &LedgerRequest,
    order_id: &str,
) -> rusqlite::Result<Option<(i64, i64)>> {
    tx.query_row(
        "SELECT id, COALESCE(applied_qty, quantity) FROM stock_movements
         WHERE reference_type = ?1 AND reference_id = ?2 AND movement_type_id = ?3
           AND product_id = ?4 AND warehouse_id = ?5",
        params![
            ORDER_REFERENCE,
            order_id,
            type_id,
            request.product_id,
            request.warehouse_id
        ],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

fn counters(level: &InventoryLevel) -> LevelCounters {
    LevelCounters::new(level.quantity, level.reserved_qty)
}

/// Shared body of the single-level operations.
async fn apply(
    db: &Database,
    request: &LedgerRequest,
    code: MovementType,
    transition: Transition,
) -> Result<LedgerOutcome, DespachoError> {
    let request = request.clone();
    db.write_tx(move |tx| {
        let now = ts(Utc::now());
        let type_id = movement_type_id(tx, code)?;
        check_product(tx, request.product_id, request.business_id)?;
        check_warehouse(tx, request.warehouse_id, request.business_id)?;

        let level = level_for_update(
            tx,
            request.product_id,
            request.warehouse_id,
            request.business_id,
            &now,
        )?;
        if let Some(order_id) = request.order_id.as_deref()
            && let Some((movement_id, applied)) =
                prior_order_movement(tx, type_id, &request, order_id)?
        {
            tracing::info!(
                order_id,
                product_id = request.product_id,
                warehouse_id = request.warehouse_id,
                movement = %code,
                movement_id,
                "order movement already applied, replaying outcome"
            );
            return Ok(LedgerOutcome {
                level,
                applied,
                movement_id,
                replayed: true,
            });
        }
        let step = transition(counters(&level), request.quantity)
            .map_err(|e| e.into_error(request.product_id, request.warehouse_id))?;
        let updated = write_level(tx, &level, step.counters, &now)?;

        let reference_type = request.order_id.as_ref().map(|_| ORDER_REFERENCE);
        let movement_id = insert_movement(
            tx,
            &NewMovement {
                type_id,
                level: &updated,
                quantity: step.movement_qty,
                previous_qty: level.quantity,
                new_qty: updated.quantity,
                reference_type,
                reference_id: request.order_id.as_deref(),
                reason: request.reason.as_deref(),
                notes: request.notes.as_deref(),
                applied: step.applied,
            },
            &now,
        )?;

        tracing::debug!(
            product_id = request.product_id,
            warehouse_id = request.warehouse_id,
            movement = %code,
            quantity = updated.quantity,
            reserved = updated.reserved_qty,
            "ledger movement applied"
        );
        Ok(LedgerOutcome {
            level: updated,
            applied: step.applied,
            movement_id,
            replayed: false,
        })
    })
    .await
}

fn require_positive(quantity: i64) -> Result<(), DespachoError> {
    if quantity <= 0 {
        return Err(DespachoError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// `quantity += request.quantity` (signed).
///
/// The movement is recorded under the request's type when it is `inbound`,
/// `outbound` or `adjustment`, and as `adjustment` otherwise.
pub async fn adjust(db: &Database, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
    if request.quantity == 0 {
        return Err(DespachoError::InvalidQuantity(0));
    }
    let code = match request.movement_type {
        MovementType::Inbound | MovementType::Outbound => request.movement_type,
        _ => MovementType::Adjustment,
    };
    apply(db, request, code, |c, q| {
        Ok(Step {
            counters: c.adjust(q)?,
            applied: q,
            movement_qty: q,
        })
    })
    .await
}

/// Reserve up to `request.quantity` units; partial reserves commit.
pub async fn reserve(db: &Database, request: &LedgerRequest) -> Result<ReserveOutcome, DespachoError> {
    require_positive(request.quantity)?;
    let outcome = apply(db, request, MovementType::Reserve, |c, q| {
        let (counters, reserved) = c.reserve(q)?;
        Ok(Step {
            counters,
            applied: reserved,
            movement_qty: reserved,
        })
    })
    .await?;
    Ok(ReserveOutcome {
        sufficient: outcome.applied == request.quantity,
        reserved: outcome.applied,
        level: outcome.level,
        movement_id: outcome.movement_id,
        replayed: outcome.replayed,
    })
}

/// Ship `request.quantity` units, consuming reservations first.
pub async fn confirm_sale(
    db: &Database,
    request: &LedgerRequest,
) -> Result<LedgerOutcome, DespachoError> {
    require_positive(request.quantity)?;
    apply(db, request, MovementType::ConfirmSale, |c, q| {
        let (counters, released) = c.confirm_sale(q)?;
        Ok(Step {
            counters,
            applied: released,
            movement_qty: -q,
        })
    })
    .await
}

/// Drop up to `request.quantity` reserved units.
pub async fn release(db: &Database, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
    require_positive(request.quantity)?;
    apply(db, request, MovementType::Release, |c, q| {
        let (counters, released) = c.release(q)?;
        Ok(Step {
            counters,
            applied: released,
            movement_qty: released,
        })
    })
    .await
}

/// Put returned units back on hand.
pub async fn return_stock(
    db: &Database,
    request: &LedgerRequest,
) -> Result<LedgerOutcome, DespachoError> {
    require_positive(request.quantity)?;
    apply(db, request, MovementType::Return, |c, q| {
        Ok(Step {
            counters: c.restock(q)?,
            applied: q,
            movement_qty: q,
        })
    })
    .await
}

/// Move units between two warehouses of one business.
///
/// Levels are read in ascending warehouse order regardless of direction.
pub async fn transfer(
    db: &Database,
    request: &TransferRequest,
) -> Result<TransferOutcome, DespachoError> {
    require_positive(request.quantity)?;
    if request.from_warehouse_id == request.to_warehouse_id {
        return Err(DespachoError::SameWarehouse(request.from_warehouse_id));
    }
    let request = request.clone();
    db.write_tx(move |tx| {
        let now = ts(Utc::now());
        let type_id = movement_type_id(tx, MovementType::Transfer)?;
        check_product(tx, request.product_id, request.business_id)?;
        check_warehouse(tx, request.from_warehouse_id, request.business_id)?;
        check_warehouse(tx, request.to_warehouse_id, request.business_id)?;

        let (first, second) = if request.from_warehouse_id < request.to_warehouse_id {
            (request.from_warehouse_id, request.to_warehouse_id)
        } else {
            (request.to_warehouse_id, request.from_warehouse_id)
        };
        let first = level_for_update(tx, request.product_id, first, request.business_id, &now)?;
        let second = level_for_update(tx, request.product_id, second, request.business_id, &now)?;
        let (from, to) = if first.warehouse_id == request.from_warehouse_id {
            (first, second)
        } else {
            (second, first)
        };

        let q = request.quantity;
        let from_counters = counters(&from)
            .withdraw(q)
            .map_err(|e| e.into_error(request.product_id, from.warehouse_id))?;
        let to_counters = counters(&to)
            .restock(q)
            .map_err(|e| e.into_error(request.product_id, to.warehouse_id))?;

        let from_updated = write_level(tx, &from, from_counters, &now)?;
        let to_updated = write_level(tx, &to, to_counters, &now)?;

        let reference_id = Uuid::new_v4().to_string();
        for (before, after, signed) in [(&from, &from_updated, -q), (&to, &to_updated, q)] {
            insert_movement(
                tx,
                &NewMovement {
                    type_id,
                    level: after,
                    quantity: signed,
                    previous_qty: before.quantity,
                    new_qty: after.quantity,
                    reference_type: Some(TRANSFER_REFERENCE),
                    reference_id: Some(&reference_id),
                    reason: request.reason.as_deref(),
                    notes: None,
                    applied: q,
                },
                &now,
            )?;
        }

        tracing::debug!(
            product_id = request.product_id,
            from = request.from_warehouse_id,
            to = request.to_warehouse_id,
            quantity = q,
            "stock transferred"
        );
        Ok(TransferOutcome {
            from: from_updated,
            to: to_updated,
            reference_id,
        })
    })
    .await
}

pub async fn level(
    db: &Database,
    product_id: i64,
    warehouse_id: i64,
) -> Result<Option<InventoryLevel>, DespachoError> {
    db.connection()
        .call(move |conn| select_level(conn, product_id, warehouse_id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Levels of a product across the business's warehouses, by warehouse id.
pub async fn levels_for_product(
    db: &Database,
    product_id: i64,
    business_id: i64,
) -> Result<Vec<InventoryLevel>, DespachoError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEVEL_COLUMNS} FROM inventory_levels
                 WHERE product_id = ?1 AND business_id = ?2 ORDER BY warehouse_id"
            ))?;
            let rows = stmt.query_map(params![product_id, business_id], level_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Movements of one level, oldest first.
pub async fn movements(
    db: &Database,
    product_id: i64,
    warehouse_id: i64,
) -> Result<Vec<StockMovement>, DespachoError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{MOVEMENT_SELECT} WHERE m.product_id = ?1 AND m.warehouse_id = ?2 ORDER BY m.id"
            ))?;
            let rows = stmt.query_map(params![product_id, warehouse_id], movement_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
