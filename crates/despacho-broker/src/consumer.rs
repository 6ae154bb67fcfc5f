// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue consumers that hand deliveries to a [`DeliveryHandler`].
//!
//! Each worker owns one channel with `basic_qos(prefetch)`, so a worker
//! never holds more unacknowledged deliveries than the prefetch allows.
//! A worker whose channel or connection fails sets itself up again after a
//! doubling delay, and every worker stops when the token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use deadpool_lapin::Pool;
use despacho_core::{Delivery, DeliveryHandler, DespachoError};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::publisher::{broker_error, declare_topic, open_channel};

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Where a consumer reads from.
#[derive(Debug, Clone)]
pub struct QueueBinding {
    pub exchange: String,
    pub queue: String,
    /// Topic pattern, e.g. `order.*`.
    pub routing_key: String,
    pub prefetch: u16,
}

/// Acknowledgement a [`Delivery`] decision maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    Ack,
    NackRequeue,
    RejectDrop,
}

impl From<Delivery> for AckAction {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Ack => AckAction::Ack,
            Delivery::Requeue => AckAction::NackRequeue,
            Delivery::Reject => AckAction::RejectDrop,
        }
    }
}

impl AckAction {
    fn label(self) -> &'static str {
        match self {
            AckAction::Ack => "ack",
            AckAction::NackRequeue => "requeue",
            AckAction::RejectDrop => "reject",
        }
    }
}

pub struct AmqpConsumer {
    pool: Pool,
    binding: QueueBinding,
}

impl AmqpConsumer {
    pub fn new(pool: Pool, binding: QueueBinding) -> Self {
        Self { pool, binding }
    }

    /// Spawn `workers` consumer tasks feeding `handler`.
    pub fn spawn(
        self: Arc<Self>,
        handler: Arc<dyn DeliveryHandler>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let consumer = self.clone();
                let handler = handler.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { consumer.run_worker(worker, handler, cancel).await })
            })
            .collect()
    }

    async fn run_worker(
        &self,
        worker: usize,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) {
        let tag = format!("despacho-{}-{worker}", handler.name());
        let mut backoff = MIN_BACKOFF;

        loop {
            let mut consumer = tokio::select! {
                result = self.setup(&tag) => match result {
                    Ok(consumer) => consumer,
                    Err(e) => {
                        error!(
                            queue = %self.binding.queue,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "failed to set up consumer, retrying after backoff"
                        );
                        if sleep_or_cancel(backoff, &cancel).await {
                            break;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                },
                _ = cancel.cancelled() => break,
            };

            info!(queue = %self.binding.queue, consumer = %tag, "consumer connected");
            backoff = MIN_BACKOFF;

            loop {
                let next = tokio::select! {
                    next = consumer.next() => next,
                    _ = cancel.cancelled() => {
                        info!(consumer = %tag, "consumer shutting down");
                        return;
                    }
                };
                match next {
                    Some(Ok(delivery)) => process_delivery(handler.as_ref(), delivery).await,
                    Some(Err(e)) => {
                        warn!(consumer = %tag, error = %e, "delivery error, reconnecting");
                        break;
                    }
                    None => {
                        info!(consumer = %tag, "consumer stream ended, reconnecting");
                        break;
                    }
                }
            }

            if sleep_or_cancel(backoff, &cancel).await {
                break;
            }
        }
    }

    async fn setup(&self, tag: &str) -> Result<lapin::Consumer, DespachoError> {
        let b = &self.binding;
        let channel = open_channel(&self.pool).await?;
        channel
            .basic_qos(b.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| broker_error("failed to set prefetch", e))?;
        declare_topic(&channel, &b.exchange).await?;
        channel
            .queue_declare(
                &b.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("failed to declare queue", e))?;
        channel
            .queue_bind(
                &b.queue,
                &b.exchange,
                &b.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("failed to bind queue", e))?;
        channel
            .basic_consume(
                &b.queue,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("failed to start consumer", e))
    }
}

async fn process_delivery(handler: &dyn DeliveryHandler, delivery: lapin::message::Delivery) {
    let routing_key = delivery.routing_key.as_str().to_string();
    let action = AckAction::from(handler.handle(&routing_key, &delivery.data).await);
    debug!(consumer = handler.name(), routing_key = %routing_key, action = action.label(), "delivery handled");
    despacho_prometheus::record_broker_delivery(handler.name(), action.label());

    let result = match action {
        AckAction::Ack => delivery.ack(BasicAckOptions::default()).await,
        AckAction::NackRequeue => {
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        AckAction::RejectDrop => {
            delivery
                .reject(BasicRejectOptions { requeue: false })
                .await
        }
    };
    if let Err(e) = result {
        error!(routing_key = %routing_key, error = %e, "failed to acknowledge delivery");
    }
}

/// Returns `true` if cancelled during the wait.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancel.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_maps_to_ack_action() {
        assert_eq!(AckAction::from(Delivery::Ack), AckAction::Ack);
        assert_eq!(AckAction::from(Delivery::Requeue), AckAction::NackRequeue);
        assert_eq!(AckAction::from(Delivery::Reject), AckAction::RejectDrop);
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sleep_or_cancel(Duration::from_secs(60), &cancel).await);
    }

    #[tokio::test]
    async fn workers_stop_on_cancel_without_a_broker() {
        struct Nothing;
        #[async_trait::async_trait]
        impl DeliveryHandler for Nothing {
            fn name(&self) -> &str {
                "nothing"
            }
            async fn handle(&self, _: &str, _: &[u8]) -> Delivery {
                Delivery::Ack
            }
        }

        let pool = crate::connect_pool("amqp://127.0.0.1:1/%2f", 1).unwrap();
        let consumer = Arc::new(AmqpConsumer::new(
            pool,
            QueueBinding {
                exchange: "orders".into(),
                queue: "q".into(),
                routing_key: "order.*".into(),
                prefetch: 1,
            },
        ));
        let cancel = CancellationToken::new();
        let handles = consumer.spawn(Arc::new(Nothing), 2, cancel.clone());
        assert_eq!(handles.len(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
