// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-through inventory queries.

use std::sync::Arc;

use despacho_core::inventory::InventoryLevel;
use despacho_core::{DespachoError, InventoryCache, StockLedger};
use tracing::{debug, warn};

/// Serves level reads from the cache and falls back to the ledger.
///
/// On a miss the ledger result is returned immediately and written back to
/// the cache on a spawned task. Without a cache every read is a miss.
#[derive(Clone)]
pub struct InventoryReader {
    ledger: Arc<dyn StockLedger>,
    cache: Option<Arc<dyn InventoryCache>>,
}

impl InventoryReader {
    pub fn new(ledger: Arc<dyn StockLedger>, cache: Option<Arc<dyn InventoryCache>>) -> Self {
        Self { ledger, cache }
    }

    pub async fn product_levels(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<InventoryLevel>, DespachoError> {
        if let Some(cache) = &self.cache {
            match cache.get_product_levels(product_id, business_id).await {
                Ok(Some(levels)) => {
                    debug!(product_id, business_id, "inventory cache hit");
                    return Ok(levels);
                }
                Ok(None) => {}
                Err(e) => warn!(product_id, error = %e, "inventory cache read failed (non-fatal)"),
            }
        }

        let levels = self.ledger.levels_for_product(product_id, business_id).await?;
        if let Some(cache) = self.cache.clone() {
            let snapshot = levels.clone();
            tokio::spawn(async move {
                if let Err(e) = cache
                    .put_product_levels(product_id, business_id, snapshot)
                    .await
                {
                    warn!(product_id, error = %e, "inventory cache fill failed (non-fatal)");
                }
            });
        }
        Ok(levels)
    }

    pub async fn level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError> {
        if let Some(cache) = &self.cache {
            match cache.get_level(product_id, warehouse_id).await {
                Ok(Some(level)) => return Ok(Some(level)),
                Ok(None) => {}
                Err(e) => warn!(product_id, warehouse_id, error = %e, "inventory cache read failed (non-fatal)"),
            }
        }

        let level = self.ledger.level(product_id, warehouse_id).await?;
        if let (Some(cache), Some(found)) = (self.cache.clone(), level.clone()) {
            tokio::spawn(async move {
                if let Err(e) = cache.put_level(found).await {
                    warn!(product_id, warehouse_id, error = %e, "inventory cache fill failed (non-fatal)");
                }
            });
        }
        Ok(level)
    }
}
