// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache-invalidating [`StockLedger`] decorator.

use std::sync::Arc;

use async_trait::async_trait;
use despacho_core::inventory::{
    InventoryLevel, LedgerOutcome, LedgerRequest, ReserveOutcome, StockMovement, TransferOutcome,
    TransferRequest,
};
use despacho_core::{DespachoError, InventoryCache, StockLedger};
use tracing::warn;

/// Wraps a ledger so every committed transition drops the cached product
/// view and the touched level. Cache failures are logged, never returned.
pub struct CachedLedger {
    inner: Arc<dyn StockLedger>,
    cache: Option<Arc<dyn InventoryCache>>,
}

impl CachedLedger {
    pub fn new(inner: Arc<dyn StockLedger>, cache: Option<Arc<dyn InventoryCache>>) -> Self {
        Self { inner, cache }
    }

    async fn invalidate(&self, product_id: i64, business_id: i64, warehouse_id: i64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.invalidate_product(product_id, business_id).await {
            warn!(product_id, business_id, error = %e, "product cache invalidation failed (non-fatal)");
        }
        if let Err(e) = cache.invalidate_level(product_id, warehouse_id).await {
            warn!(product_id, warehouse_id, error = %e, "level cache invalidation failed (non-fatal)");
        }
    }

    async fn after(&self, request: &LedgerRequest) {
        self.invalidate(request.product_id, request.business_id, request.warehouse_id)
            .await;
    }
}

#[async_trait]
impl StockLedger for CachedLedger {
    async fn adjust(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
        let outcome = self.inner.adjust(request).await?;
        self.after(request).await;
        Ok(outcome)
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, DespachoError> {
        let outcome = self.inner.transfer(request).await?;
        self.invalidate(request.product_id, request.business_id, request.from_warehouse_id)
            .await;
        self.invalidate(request.product_id, request.business_id, request.to_warehouse_id)
            .await;
        Ok(outcome)
    }

    async fn reserve(&self, request: &LedgerRequest) -> Result<ReserveOutcome, DespachoError> {
        let outcome = self.inner.reserve(request).await?;
        self.after(request).await;
        Ok(outcome)
    }

    async fn confirm_sale(
        &self,
        request: &LedgerRequest,
    ) -> Result<LedgerOutcome, DespachoError> {
        let outcome = self.inner.confirm_sale(request).await?;
        self.after(request).await;
        Ok(outcome)
    }

    async fn release(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
        let outcome = self.inner.release(request).await?;
        self.after(request).await;
        Ok(outcome)
    }

    async fn return_stock(
        &self,
        request: &LedgerRequest,
    ) -> Result<LedgerOutcome, DespachoError> {
        let outcome = self.inner.return_stock(request).await?;
        self.after(request).await;
        Ok(outcome)
    }

    async fn level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError> {
        self.inner.level(product_id, warehouse_id).await
    }

    async fn levels_for_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<InventoryLevel>, DespachoError> {
        self.inner.levels_for_product(product_id, business_id).await
    }

    async fn movements(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Vec<StockMovement>, DespachoError> {
        self.inner.movements(product_id, warehouse_id).await
    }
}
