// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level despacho configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DespachoConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential vault settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// WhatsApp Cloud API and webhook settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// AMQP broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Platform alert notifications to the admin phone.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("despacho").join("despacho.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("despacho.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Vault key-derivation parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API base URL, including the version segment.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Token echoed back during webhook verification. `None` rejects every
    /// verification request.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// App secret used to sign webhook payloads. `None` rejects every POST.
    #[serde(default)]
    pub app_secret: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,

    /// Hours a conversation stays active after its last state change.
    #[serde(default = "default_conversation_ttl_hours")]
    pub conversation_ttl_hours: i64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            verify_token: None,
            app_secret: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_wait_secs: default_retry_wait_secs(),
            conversation_ttl_hours: default_conversation_ttl_hours(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_wait_secs() -> u64 {
    5
}

fn default_conversation_ttl_hours() -> i64 {
    24
}

/// AMQP broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// `None` runs without a broker: no consumers, publishes are dropped.
    #[serde(default)]
    pub url: Option<String>,

    /// Topic exchange carrying order lifecycle events.
    #[serde(default = "default_orders_exchange")]
    pub orders_exchange: String,

    /// Topic exchange carrying inventory sync messages.
    #[serde(default = "default_inventory_exchange")]
    pub inventory_exchange: String,

    /// Durable queue the inventory engine consumes order events from.
    #[serde(default = "default_order_queue")]
    pub order_queue: String,

    #[serde(default = "default_alerts_exchange")]
    pub alerts_exchange: String,

    #[serde(default = "default_alerts_queue")]
    pub alerts_queue: String,

    /// Unacknowledged deliveries per consumer channel.
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,

    /// Consumer channels opened on the order queue.
    #[serde(default = "default_order_workers")]
    pub order_workers: usize,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            orders_exchange: default_orders_exchange(),
            inventory_exchange: default_inventory_exchange(),
            order_queue: default_order_queue(),
            alerts_exchange: default_alerts_exchange(),
            alerts_queue: default_alerts_queue(),
            prefetch: default_prefetch(),
            order_workers: default_order_workers(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_orders_exchange() -> String {
    "orders".to_string()
}

fn default_inventory_exchange() -> String {
    "inventory".to_string()
}

fn default_order_queue() -> String {
    "inventory.order-events".to_string()
}

fn default_alerts_exchange() -> String {
    "alerts".to_string()
}

fn default_alerts_queue() -> String {
    "whatsapp.alerts".to_string()
}

fn default_prefetch() -> u16 {
    1
}

fn default_order_workers() -> usize {
    1
}

fn default_pool_size() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Disable to read every view straight from the ledger.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// `source` field stamped on outgoing sync messages.
    #[serde(default = "default_sync_source")]
    pub sync_source: String,

    /// Interval of the cache and conversation sweepers.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            sync_source: default_sync_source(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_sync_source() -> String {
    "despacho".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Admin alert notifications. Credentials here belong to the platform's own
/// WhatsApp number, not to any business.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub admin_phone: Option<String>,

    #[serde(default)]
    pub phone_number_id: Option<String>,

    #[serde(default)]
    pub access_token: Option<String>,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for `/v1` routes. `None` rejects every `/v1` request.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}
