// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Products, warehouses, and channel integrations.
//!
//! The catalog is owned by the storefront; despacho keeps the projection it
//! needs for stock decisions. The insert helpers seed that projection from
//! the CLI and from tests.

use despacho_core::DespachoError;
use despacho_core::inventory::{Product, ProductIntegration, Warehouse};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, TxError};
use crate::models::{product_from_row, warehouse_from_row};

pub async fn product(
    db: &Database,
    product_id: i64,
    business_id: i64,
) -> Result<Option<Product>, DespachoError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, business_id, name, sku, tracks_inventory, stock
                 FROM products WHERE id = ?1 AND business_id = ?2",
                params![product_id, business_id],
                product_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The business's default warehouse. Lowest id wins if several are flagged.
pub async fn default_warehouse(
    db: &Database,
    business_id: i64,
) -> Result<Option<Warehouse>, DespachoError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, business_id, name, is_default FROM warehouses
                 WHERE business_id = ?1 AND is_default = 1 ORDER BY id LIMIT 1",
                params![business_id],
                warehouse_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn integrations_for_product(
    db: &Database,
    product_id: i64,
    business_id: i64,
) -> Result<Vec<ProductIntegration>, DespachoError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT product_id, business_id, integration_id, external_product_id
                 FROM product_integrations
                 WHERE product_id = ?1 AND business_id = ?2 ORDER BY integration_id",
            )?;
            let rows = stmt.query_map(params![product_id, business_id], |row| {
                Ok(ProductIntegration {
                    product_id: row.get(0)?,
                    business_id: row.get(1)?,
                    integration_id: row.get(2)?,
                    external_product_id: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store the sum of on-hand units across the product's levels on the
/// product row and return it.
pub async fn recompute_product_stock(
    db: &Database,
    product_id: i64,
    business_id: i64,
) -> Result<i64, DespachoError> {
    db.write_tx(move |tx| {
        let total: i64 = tx.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_levels
             WHERE product_id = ?1 AND business_id = ?2",
            params![product_id, business_id],
            |row| row.get(0),
        )?;
        let changed = tx.execute(
            "UPDATE products SET stock = ?1 WHERE id = ?2 AND business_id = ?3",
            params![total, product_id, business_id],
        )?;
        if changed == 0 {
            return Err(TxError::Domain(DespachoError::ProductNotFound(product_id)));
        }
        Ok(total)
    })
    .await
}

pub async fn insert_warehouse(
    db: &Database,
    business_id: i64,
    name: &str,
    is_default: bool,
) -> Result<Warehouse, DespachoError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO warehouses (business_id, name, is_default) VALUES (?1, ?2, ?3)",
                params![business_id, name, is_default],
            )?;
            Ok(Warehouse {
                id: conn.last_insert_rowid(),
                business_id,
                name,
                is_default,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn insert_product(
    db: &Database,
    business_id: i64,
    name: &str,
    sku: &str,
    tracks_inventory: bool,
) -> Result<Product, DespachoError> {
    let name = name.to_string();
    let sku = sku.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO products (business_id, name, sku, tracks_inventory) VALUES (?1, ?2, ?3, ?4)",
                params![business_id, name, sku, tracks_inventory],
            )?;
            Ok(Product {
                id: conn.last_insert_rowid(),
                business_id,
                name,
                sku,
                tracks_inventory,
                stock: 0,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Link a product to an external channel, replacing any previous mapping.
pub async fn link_integration(
    db: &Database,
    integration: &ProductIntegration,
) -> Result<(), DespachoError> {
    let link = integration.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO product_integrations (product_id, business_id, integration_id, external_product_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (product_id, integration_id)
                 DO UPDATE SET external_product_id = excluded.external_product_id",
                params![
                    link.product_id,
                    link.business_id,
                    link.integration_id,
                    link.external_product_id
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::ledger;
    use despacho_core::inventory::{LedgerRequest, MovementType};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn products_are_scoped_to_business() {
        let (db, _dir) = setup_db().await;
        let p = insert_product(&db, 1, "Camisa", "CAM-01", true).await.unwrap();
        assert_eq!(product(&db, p.id, 1).await.unwrap(), Some(p.clone()));
        assert_eq!(product(&db, p.id, 2).await.unwrap(), None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn default_warehouse_lookup() {
        let (db, _dir) = setup_db().await;
        insert_warehouse(&db, 1, "Secundaria", false).await.unwrap();
        assert!(default_warehouse(&db, 1).await.unwrap().is_none());

        let main = insert_warehouse(&db, 1, "Principal", true).await.unwrap();
        assert_eq!(default_warehouse(&db, 1).await.unwrap(), Some(main));
        assert!(default_warehouse(&db, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn integrations_relink_in_place() {
        let (db, _dir) = setup_db().await;
        let p = insert_product(&db, 1, "Camisa", "CAM-01", true).await.unwrap();
        let mut link = ProductIntegration {
            product_id: p.id,
            business_id: 1,
            integration_id: 4,
            external_product_id: "shopify-1".into(),
        };
        link_integration(&db, &link).await.unwrap();
        link.external_product_id = "shopify-2".into();
        link_integration(&db, &link).await.unwrap();

        let links = integrations_for_product(&db, p.id, 1).await.unwrap();
        assert_eq!(links, vec![link]);
        assert!(integrations_for_product(&db, p.id, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recompute_sums_all_warehouses() {
        let (db, _dir) = setup_db().await;
        let a = insert_warehouse(&db, 1, "A", true).await.unwrap();
        let b = insert_warehouse(&db, 1, "B", false).await.unwrap();
        let p = insert_product(&db, 1, "Camisa", "CAM-01", true).await.unwrap();
        assert_eq!(recompute_product_stock(&db, p.id, 1).await.unwrap(), 0);

        for (wh, q) in [(a.id, 7), (b.id, 5)] {
            ledger::adjust(&db, &LedgerRequest::new(p.id, wh, 1, q, MovementType::Inbound))
                .await
                .unwrap();
        }
        assert_eq!(recompute_product_stock(&db, p.id, 1).await.unwrap(), 12);
        assert_eq!(product(&db, p.id, 1).await.unwrap().unwrap().stock, 12);

        let err = recompute_product_stock(&db, 999, 1).await.unwrap_err();
        assert_eq!(err.code(), "PRODUCT_NOT_FOUND");
    }
}
