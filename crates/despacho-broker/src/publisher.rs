// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-exchange publishers.

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool};
use despacho_config::model::BrokerConfig;
use despacho_core::conversation::ConversationEvent;
use despacho_core::inventory::InventorySyncMessage;
use despacho_core::{
    Adapter, AdapterType, ConversationEventPublisher, DespachoError, HealthStatus, SyncPublisher,
};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use tracing::{debug, info};

/// Routing key of a conversation business event on the orders exchange.
pub fn conversation_routing_key(event_type: &str) -> String {
    format!("whatsapp.{event_type}")
}

pub(crate) fn broker_error(context: &str, e: impl std::fmt::Display) -> DespachoError {
    DespachoError::broker(format!("{context}: {e}"))
}

/// Build a connection pool. No connection is opened until first use.
pub fn connect_pool(url: &str, max_size: usize) -> Result<Pool, DespachoError> {
    let manager = Manager::new(url.to_string(), ConnectionProperties::default());
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| broker_error("failed to create pool", e))
}

pub(crate) async fn open_channel(pool: &Pool) -> Result<Channel, DespachoError> {
    let conn = pool
        .get()
        .await
        .map_err(|e| broker_error("failed to get connection from pool", e))?;
    conn.create_channel()
        .await
        .map_err(|e| broker_error("failed to create channel", e))
}

pub(crate) async fn declare_topic(channel: &Channel, exchange: &str) -> Result<(), DespachoError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| broker_error("failed to declare exchange", e))
}

/// Publishes sync messages to the inventory exchange and conversation
/// events to the orders exchange, as persistent JSON messages.
pub struct AmqpPublisher {
    pool: Pool,
    orders_exchange: String,
    inventory_exchange: String,
}

impl AmqpPublisher {
    /// Connect and declare both exchanges.
    pub async fn connect(pool: Pool, config: &BrokerConfig) -> Result<Self, DespachoError> {
        let channel = open_channel(&pool).await?;
        declare_topic(&channel, &config.orders_exchange).await?;
        declare_topic(&channel, &config.inventory_exchange).await?;
        info!(
            orders = %config.orders_exchange,
            inventory = %config.inventory_exchange,
            "connected to AMQP"
        );
        Ok(Self {
            pool,
            orders_exchange: config.orders_exchange.clone(),
            inventory_exchange: config.inventory_exchange.clone(),
        })
    }

    async fn publish_json<T: Serialize + ?Sized>(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &T,
    ) -> Result<(), DespachoError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| DespachoError::Internal(format!("failed to encode message: {e}")))?;
        let channel = open_channel(&self.pool).await?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| broker_error("failed to publish", e))?
            .await
            .map_err(|e| broker_error("publish confirmation failed", e))?;

        debug!(exchange, routing_key, bytes = payload.len(), "published");
        Ok(())
    }
}

#[async_trait]
impl SyncPublisher for AmqpPublisher {
    async fn publish_sync(&self, message: &InventorySyncMessage) -> Result<(), DespachoError> {
        self.publish_json(&self.inventory_exchange, &message.routing_key(), message)
            .await
    }
}

#[async_trait]
impl ConversationEventPublisher for AmqpPublisher {
    async fn publish_conversation_event(
        &self,
        event: &ConversationEvent,
    ) -> Result<(), DespachoError> {
        let routing_key = conversation_routing_key(&event.event_type);
        self.publish_json(&self.orders_exchange, &routing_key, event)
            .await
    }
}

#[async_trait]
impl Adapter for AmqpPublisher {
    fn name(&self) -> &str {
        "amqp"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broker
    }

    async fn health_check(&self) -> Result<HealthStatus, DespachoError> {
        match self.pool.get().await {
            Ok(conn) if conn.status().connected() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded("connection not open".into())),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), DespachoError> {
        self.pool.close();
        Ok(())
    }
}

/// Publisher used when no broker is configured. Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl SyncPublisher for NoopPublisher {
    async fn publish_sync(&self, message: &InventorySyncMessage) -> Result<(), DespachoError> {
        debug!(routing_key = %message.routing_key(), "no broker configured, sync dropped");
        Ok(())
    }
}

#[async_trait]
impl ConversationEventPublisher for NoopPublisher {
    async fn publish_conversation_event(
        &self,
        event: &ConversationEvent,
    ) -> Result<(), DespachoError> {
        debug!(event_type = %event.event_type, "no broker configured, conversation event dropped");
        Ok(())
    }
}
