// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AMQP plumbing: [`AmqpPublisher`] for outbound topics and
//! [`AmqpConsumer`] for the order and alert queues.

pub mod consumer;
pub mod publisher;

pub use consumer::{AckAction, AmqpConsumer, QueueBinding};
pub use publisher::{AmqpPublisher, NoopPublisher, connect_pool, conversation_routing_key};

use despacho_config::model::BrokerConfig;

/// Binding of the queue the inventory engine consumes order events from.
pub fn order_binding(config: &BrokerConfig) -> QueueBinding {
    QueueBinding {
        exchange: config.orders_exchange.clone(),
        queue: config.order_queue.clone(),
        routing_key: "order.*".to_string(),
        prefetch: config.prefetch,
    }
}

pub fn alerts_binding(config: &BrokerConfig) -> QueueBinding {
    QueueBinding {
        exchange: config.alerts_exchange.clone(),
        queue: config.alerts_queue.clone(),
        routing_key: "#".to_string(),
        prefetch: config.prefetch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_binding_matches_lifecycle_events_only() {
        let config = BrokerConfig::default();
        let binding = order_binding(&config);
        assert_eq!(binding.exchange, "orders");
        assert_eq!(binding.routing_key, "order.*");
        assert_eq!(binding.prefetch, 1);
        assert_eq!(alerts_binding(&config).queue, config.alerts_queue);
    }
}
