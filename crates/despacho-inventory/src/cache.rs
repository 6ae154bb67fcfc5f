// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process inventory cache with per-entry expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use despacho_core::inventory::{InventoryLevel, level_cache_key, product_cache_key};
use despacho_core::{DespachoError, InventoryCache};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
enum Cached {
    Product(Vec<InventoryLevel>),
    Level(InventoryLevel),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Cached,
    expires_at: Instant,
}

/// [`InventoryCache`] over a concurrent map. Expired entries read as misses
/// and are removed by [`sweep`](Self::sweep).
pub struct MemoryInventoryCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl MemoryInventoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<Cached> {
        let entry = self.entries.get(key)?;
        (entry.expires_at > Instant::now()).then(|| entry.value.clone())
    }

    fn put(&self, key: String, value: Cached) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = self.len(), "inventory cache swept");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("inventory cache sweeper shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for MemoryInventoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl InventoryCache for MemoryInventoryCache {
    async fn get_product_levels(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<Option<Vec<InventoryLevel>>, DespachoError> {
        Ok(match self.get(&product_cache_key(product_id, business_id)) {
            Some(Cached::Product(levels)) => Some(levels),
            _ => None,
        })
    }

    async fn put_product_levels(
        &self,
        product_id: i64,
        business_id: i64,
        levels: Vec<InventoryLevel>,
    ) -> Result<(), DespachoError> {
        self.put(product_cache_key(product_id, business_id), Cached::Product(levels));
        Ok(())
    }

    async fn invalidate_product(
        &self,
        product_id: i64,
        business_id: i64,
    ) -> Result<(), DespachoError> {
        self.entries.remove(&product_cache_key(product_id, business_id));
        Ok(())
    }

    async fn get_level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<InventoryLevel>, DespachoError> {
        Ok(match self.get(&level_cache_key(product_id, warehouse_id)) {
            Some(Cached::Level(level)) => Some(level),
            _ => None,
        })
    }

    async fn put_level(&self, level: InventoryLevel) -> Result<(), DespachoError> {
        let key = level_cache_key(level.product_id, level.warehouse_id);
        self.put(key, Cached::Level(level));
        Ok(())
    }

    async fn invalidate_level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<(), DespachoError> {
        self.entries.remove(&level_cache_key(product_id, warehouse_id));
        Ok(())
    }
}
