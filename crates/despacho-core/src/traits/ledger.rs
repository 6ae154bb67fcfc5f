// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional stock ledger.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::inventory::{
    InventoryLevel, LedgerOutcome, LedgerRequest, ReserveOutcome, StockMovement, TransferOutcome,
    TransferRequest,
};

/// Per (product, warehouse) counters with atomic transitions.
///
/// Each mutating call is one transaction: the level is locked, updated, and
/// a [`StockMovement`] appended before commit. Missing levels are created
/// with zero counters on first touch.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// `quantity += request.quantity`. `INSUFFICIENT_STOCK` if it would go negative.
    async fn adjust(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError>;

    /// Move units between two warehouses of the same business.
    async fn transfer(&self, request: &TransferRequest)
    -> Result<TransferOutcome, DespachoError>;

    /// Reserve up to the requested units. Partial reserves commit.
    async fn reserve(&self, request: &LedgerRequest) -> Result<ReserveOutcome, DespachoError>;

    async fn confirm_sale(&self, request: &LedgerRequest)
    -> Result<LedgerOutcome, DespachoError>;

    async fn release(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError>;

    async fn return_stock(&self, request: &LedgerRequest)
    -> Result<LedgerOutcome, DespachoError>;

    async fn level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError>;

    async fn levels_for_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<InventoryLevel>, DespachoError>;

    /// Movements for one level, oldest first.
    async fn movements(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Vec<StockMovement>, DespachoError>;
}
