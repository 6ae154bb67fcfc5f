// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `despacho serve`: wires storage, vault, ledger, broker, conversation
//! engine and gateway, then runs until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use despacho_broker::{AmqpConsumer, AmqpPublisher, NoopPublisher};
use despacho_bus::EventBus;
use despacho_config::model::DespachoConfig;
use despacho_conversation::{ConversationEngine, ConversationSweeper, MessageSender};
use despacho_core::{
    Adapter, ConversationEventPublisher, DespachoError, InventoryCache, SyncPublisher,
};
use despacho_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig, WebhookConfig};
use despacho_inventory::{
    CachedLedger, InventoryOrchestrator, InventoryReader, MemoryInventoryCache, OrderEventHandler,
};
use despacho_prometheus::PrometheusAdapter;
use despacho_vault::VaultCredentialStore;
use despacho_whatsapp::{AlertNotifier, CloudApiClient, WhatsAppClient};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::credentials::{open_storage, open_vault};
use crate::shutdown;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the service until SIGINT or SIGTERM.
pub async fn run_serve(config: DespachoConfig) -> Result<(), DespachoError> {
    info!("starting despacho v{}", env!("CARGO_PKG_VERSION"));
    let cancel = shutdown::install_signal_handler();

    let prometheus = Arc::new(PrometheusAdapter::new()?);
    let storage = open_storage(&config).await?;
    let vault = open_vault(&storage, &config, false).await?;
    info!("vault unlocked");
    let credentials = Arc::new(VaultCredentialStore::new(vault, storage.clone()));
    let client: Arc<dyn WhatsAppClient> = Arc::new(CloudApiClient::new(&config.whatsapp)?);

    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    adapters.push(storage.clone());
    adapters.push(prometheus.clone());

    // Broker: publisher plus the pool the consumers share.
    let pool = match config.broker.url.as_deref() {
        Some(url) => Some(despacho_broker::connect_pool(url, config.broker.pool_size)?),
        None => None,
    };
    let sync: Arc<dyn SyncPublisher>;
    let conversation_events: Arc<dyn ConversationEventPublisher>;
    match &pool {
        Some(pool) => {
            let publisher = Arc::new(AmqpPublisher::connect(pool.clone(), &config.broker).await?);
            adapters.push(publisher.clone());
            sync = publisher.clone();
            conversation_events = publisher;
        }
        None => {
            warn!("broker.url not set -- events and sync messages will not be published");
            let noop = Arc::new(NoopPublisher);
            sync = noop.clone();
            conversation_events = noop;
        }
    }

    // Inventory.
    let bus = Arc::new(EventBus::default());
    let cache = config.inventory.cache_enabled.then(|| {
        Arc::new(MemoryInventoryCache::new(Duration::from_secs(
            config.inventory.cache_ttl_secs,
        )))
    });
    let dyn_cache = cache.clone().map(|c| c as Arc<dyn InventoryCache>);
    let ledger = Arc::new(CachedLedger::new(storage.clone(), dyn_cache.clone()));
    let orchestrator = Arc::new(
        InventoryOrchestrator::new(
            ledger.clone(),
            storage.clone(),
            credentials.clone(),
            sync,
            bus.clone(),
        )
        .with_sync_source(config.inventory.sync_source.clone()),
    );
    let reader = InventoryReader::new(ledger, dyn_cache);

    // Conversations.
    let ttl = chrono::Duration::hours(config.whatsapp.conversation_ttl_hours);
    let sender = Arc::new(MessageSender::new(
        client.clone(),
        storage.clone(),
        storage.clone(),
        credentials,
        ttl,
    ));
    let engine = Arc::new(ConversationEngine::new(
        storage.clone(),
        storage.clone(),
        sender,
        conversation_events,
        ttl,
    ));

    // Background tasks.
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let sweep_interval = Duration::from_secs(config.inventory.sweep_interval_secs.max(1));

    let sweeper = Arc::new(ConversationSweeper::new(storage.clone(), chrono::Utc::now()));
    tasks.push(tokio::spawn(sweeper.run(sweep_interval, cancel.child_token())));
    if let Some(cache) = cache {
        tasks.push(tokio::spawn(
            cache.run_sweeper(sweep_interval, cancel.child_token()),
        ));
    }

    let alerts = AlertNotifier::from_config(&config.alerts, client)?;
    match &pool {
        Some(pool) => {
            let orders = Arc::new(AmqpConsumer::new(
                pool.clone(),
                despacho_broker::order_binding(&config.broker),
            ));
            tasks.extend(orders.spawn(
                Arc::new(OrderEventHandler::new(orchestrator)),
                config.broker.order_workers,
                cancel.child_token(),
            ));
            info!(workers = config.broker.order_workers, "order event consumer started");

            if let Some(alerts) = alerts {
                let consumer = Arc::new(AmqpConsumer::new(
                    pool.clone(),
                    despacho_broker::alerts_binding(&config.broker),
                ));
                tasks.extend(consumer.spawn(Arc::new(alerts), 1, cancel.child_token()));
                info!("alert consumer started");
            }
        }
        None => {
            if alerts.is_some() {
                warn!("alerts enabled but broker.url not set -- alert consumer not started");
            }
        }
    }

    // Gateway runs on this task; everything else winds down after it.
    let result = if config.gateway.enabled {
        let render_handle = prometheus.clone();
        let state = GatewayState {
            webhook: WebhookConfig {
                verify_token: config.whatsapp.verify_token.clone(),
                app_secret: config.whatsapp.app_secret.clone(),
            },
            sink: engine,
            reader,
            bus,
            auth: AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render: Some(Arc::new(move || render_handle.render())),
                adapters: Arc::new(adapters.clone()),
            },
        };
        let server = ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
        };
        despacho_gateway::start_server(&server, state, cancel.child_token()).await
    } else {
        info!("gateway disabled -- running consumers only");
        cancel.cancelled().await;
        Ok(())
    };

    if let Err(e) = &result {
        error!(error = %e, "gateway failed, shutting down");
    }
    cancel.cancel();
    shutdown::drain_tasks(tasks, DRAIN_TIMEOUT).await;

    for adapter in adapters.iter().rev() {
        if let Err(e) = adapter.shutdown().await {
            warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed (non-fatal)");
        }
    }
    info!("despacho stopped");
    result
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("despacho={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
