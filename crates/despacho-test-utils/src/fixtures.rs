// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage and credential fixtures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use despacho_config::model::StorageConfig;
use despacho_core::inventory::{
    InventoryLevel, LedgerRequest, MovementType, Product, ProductIntegration, Warehouse,
};
use despacho_core::{CredentialStore, DespachoError, StockLedger, WhatsAppCredentials};
use despacho_storage::queries::catalog;
use despacho_storage::{Database, SqliteStorage};

/// A migrated SQLite database in a temp directory, removed on drop.
pub struct TestStorage {
    pub storage: Arc<SqliteStorage>,
    pub db: Database,
    _dir: tempfile::TempDir,
}

impl TestStorage {
    /// Panics if the temp directory or database cannot be created.
    pub async fn new() -> Self {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let path = dir.path().join("test.db").to_string_lossy().into_owned();
        let db = Database::open(&path).await.expect("open test database");
        let storage = SqliteStorage::from_database(
            StorageConfig {
                database_path: path,
                wal_mode: true,
            },
            db.clone(),
        );
        Self {
            storage: Arc::new(storage),
            db,
            _dir: dir,
        }
    }

    pub async fn warehouse(&self, business_id: i64, name: &str, is_default: bool) -> Warehouse {
        catalog::insert_warehouse(&self.db, business_id, name, is_default)
            .await
            .expect("insert warehouse")
    }

    pub async fn product(&self, business_id: i64, name: &str, sku: &str) -> Product {
        catalog::insert_product(&self.db, business_id, name, sku, true)
            .await
            .expect("insert product")
    }

    /// A product that does not track inventory.
    pub async fn untracked_product(&self, business_id: i64, name: &str, sku: &str) -> Product {
        catalog::insert_product(&self.db, business_id, name, sku, false)
            .await
            .expect("insert product")
    }

    pub async fn link(&self, product: &Product, integration_id: i64, external_id: &str) {
        catalog::link_integration(
            &self.db,
            &ProductIntegration {
                product_id: product.id,
                business_id: product.business_id,
                integration_id,
                external_product_id: external_id.to_string(),
            },
        )
        .await
        .expect("link integration");
    }

    /// Receive `quantity` units of `product` at `warehouse_id`.
    pub async fn stock(&self, product: &Product, warehouse_id: i64, quantity: i64) -> InventoryLevel {
        let request = LedgerRequest::new(
            product.id,
            warehouse_id,
            product.business_id,
            quantity,
            MovementType::Inbound,
        );
        self.storage
            .adjust(&request)
            .await
            .expect("stock product")
            .level
    }

    /// Reserve `quantity` units, as an earlier order would have.
    pub async fn reserve(&self, product: &Product, warehouse_id: i64, quantity: i64) {
        let request = LedgerRequest::new(
            product.id,
            warehouse_id,
            product.business_id,
            quantity,
            MovementType::Reserve,
        )
        .with_order("ORD-EARLIER");
        self.storage.reserve(&request).await.expect("reserve stock");
    }
}

/// In-memory [`CredentialStore`].
#[derive(Default)]
pub struct StaticCredentials {
    credentials: HashMap<i64, (String, String)>,
    warehouses: HashMap<i64, i64>,
}

impl StaticCredentials {
    /// Credentials for one business: phone number id `10<business_id>`.
    pub fn for_business(business_id: i64) -> Self {
        Self::default().with_business(business_id)
    }

    pub fn with_business(mut self, business_id: i64) -> Self {
        self.credentials.insert(
            business_id,
            (format!("10{business_id}"), format!("token-{business_id}")),
        );
        self
    }

    pub fn with_default_warehouse(mut self, business_id: i64, warehouse_id: i64) -> Self {
        self.warehouses.insert(business_id, warehouse_id);
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn whatsapp_credentials(
        &self,
        business_id: i64,
    ) -> Result<WhatsAppCredentials, DespachoError> {
        let (phone_number_id, token) = self
            .credentials
            .get(&business_id)
            .ok_or(DespachoError::CredentialsNotFound(business_id))?;
        Ok(WhatsAppCredentials {
            phone_number_id: phone_number_id.clone(),
            access_token: SecretString::from(token.clone()),
        })
    }

    async fn default_warehouse(&self, business_id: i64) -> Result<Option<i64>, DespachoError> {
        Ok(self.warehouses.get(&business_id).copied())
    }
}
