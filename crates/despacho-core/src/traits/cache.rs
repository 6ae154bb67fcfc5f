// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory read cache.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::inventory::InventoryLevel;

/// Cache of product-level and warehouse-level inventory views.
///
/// Keys follow [`product_cache_key`](crate::inventory::product_cache_key) and
/// [`level_cache_key`](crate::inventory::level_cache_key). A miss is `Ok(None)`.
#[async_trait]
pub trait InventoryCache: Send + Sync {
    async fn get_product_levels(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Option<Vec<InventoryLevel>>, DespachoError>;

    async fn put_product_levels(
        &self,
        product_id: i64,
        business_id: i64,
        levels: Vec<InventoryLevel>,
    ) -> Result<(), DespachoError>;

    async fn invalidate_product(&self, product_id: i64, business_id: i64)
    -> Result<(), DespachoError>;

    async fn get_level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError>;

    async fn put_level(&self, level: InventoryLevel) -> Result<(), DespachoError>;

    async fn invalidate_level(&self, product_id: i64, warehouse_id: i64)
    -> Result<(), DespachoError>;
}
