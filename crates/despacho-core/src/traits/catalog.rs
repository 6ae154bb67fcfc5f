// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to the product catalog and its channel integrations.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::inventory::{Product, ProductIntegration, Warehouse};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fetch a product scoped to its business.
    async fn product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Option<Product>, DespachoError>;

    async fn default_warehouse(&self, business_id: i64)
    -> Result<Option<Warehouse>, DespachoError>;

    /// External sales channels linked to the product.
    async fn integrations_for_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<ProductIntegration>, DespachoError>;

    /// Sum on-hand quantity over the product's levels, store it on the
    /// product row, and return it.
    async fn recompute_product_stock(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<i64, DespachoError>;
}
