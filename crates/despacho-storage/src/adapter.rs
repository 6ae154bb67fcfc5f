// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage-facing core traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use despacho_config::model::StorageConfig;
use despacho_core::conversation::{Conversation, MessageLog, MessageStatus, StateUpdate};
use despacho_core::inventory::{
    InventoryLevel, LedgerOutcome, LedgerRequest, Product, ProductIntegration, ReserveOutcome,
    StockMovement, TransferOutcome, TransferRequest, Warehouse,
};
use despacho_core::{
    Adapter, AdapterType, CatalogRepository, ConversationStore, DespachoError, HealthStatus,
    MessageLogStore, StockLedger,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates every operation to the typed
/// query modules. The database is opened by [`SqliteStorage::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](Self::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, DespachoError> {
        self.db.get().ok_or_else(|| DespachoError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    pub async fn initialize(&self) -> Result<(), DespachoError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| DespachoError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn checkpoint(&self) -> Result<(), DespachoError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(crate::database::map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DespachoError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DespachoError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl ConversationStore for SqliteStorage {
    async fn upsert(&self, conversation: &Conversation) -> Result<Conversation, DespachoError> {
        queries::conversations::upsert(self.database()?, conversation).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conversation>, DespachoError> {
        queries::conversations::get(self.database()?, id).await
    }

    async fn find_active(
        &self,
        phone_number: &str,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, DespachoError> {
        queries::conversations::find_active(self.database()?, phone_number, order_number, now).await
    }

    async fn find_open_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Conversation>, DespachoError> {
        queries::conversations::find_open_by_phone(self.database()?, phone_number).await
    }

    async fn update_state(&self, update: &StateUpdate) -> Result<Conversation, DespachoError> {
        queries::conversations::update_state(self.database()?, update).await
    }

    async fn record_outbound(
        &self,
        id: Uuid,
        message_id: &str,
        template_name: &str,
    ) -> Result<(), DespachoError> {
        queries::conversations::record_outbound(self.database()?, id, message_id, template_name)
            .await
    }

    async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, DespachoError> {
        queries::conversations::count_active(self.database()?, now).await
    }

    async fn count_expired_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<i64, DespachoError> {
        queries::conversations::count_expired_between(self.database()?, since, until).await
    }
}

#[async_trait]
impl MessageLogStore for SqliteStorage {
    async fn insert(&self, log: &MessageLog) -> Result<bool, DespachoError> {
        queries::messages::insert(self.database()?, log).await
    }

    async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DespachoError> {
        queries::messages::update_status(self.database()?, message_id, status, at).await
    }

    async fn get_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<MessageLog>, DespachoError> {
        queries::messages::get_by_message_id(self.database()?, message_id).await
    }

    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageLog>, DespachoError> {
        queries::messages::list_for_conversation(self.database()?, conversation_id).await
    }
}

#[async_trait]
impl StockLedger for SqliteStorage {
    async fn adjust(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
        queries::ledger::adjust(self.database()?, request).await
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, DespachoError> {
        queries::ledger::transfer(self.database()?, request).await
    }

    async fn reserve(&self, request: &LedgerRequest) -> Result<ReserveOutcome, DespachoError> {
        queries::ledger::reserve(self.database()?, request).await
    }

    async fn confirm_sale(
        &self,
        request: &LedgerRequest,
    ) -> Result<LedgerOutcome, DespachoError> {
        queries::ledger::confirm_sale(self.database()?, request).await
    }

    async fn release(&self, request: &LedgerRequest) -> Result<LedgerOutcome, DespachoError> {
        queries::ledger::release(self.database()?, request).await
    }

    async fn return_stock(
        &self,
        request: &LedgerRequest,
    ) -> Result<LedgerOutcome, DespachoError> {
        queries::ledger::return_stock(self.database()?, request).await
    }

    async fn level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError> {
        queries::ledger::level(self.database()?, product_id, warehouse_id).await
    }

    async fn levels_for_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<InventoryLevel>, DespachoError> {
        queries::ledger::levels_for_product(self.database()?, product_id, business_id).await
    }

    async fn movements(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Vec<StockMovement>, DespachoError> {
        queries::ledger::movements(self.database()?, product_id, warehouse_id).await
    }
}

#[async_trait]
impl CatalogRepository for SqliteStorage {
    async fn product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Option<Product>, DespachoError> {
        queries::catalog::product(self.database()?, product_id, business_id).await
    }

    async fn default_warehouse(
        &self,
        business_id: i64,
    ) -> Result<Option<Warehouse>, DespachoError> {
        queries::catalog::default_warehouse(self.database()?, business_id).await
    }

    async fn integrations_for_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Vec<ProductIntegration>, DespachoError> {
        queries::catalog::integrations_for_product(self.database()?, product_id, business_id).await
    }

    async fn recompute_product_stock(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<i64, DespachoError> {
        queries::catalog::recompute_product_stock(self.database()?, product_id, business_id).await
    }
}
