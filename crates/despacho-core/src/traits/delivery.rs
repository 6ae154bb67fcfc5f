// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker-agnostic message handling.

use async_trait::async_trait;

/// What a consumer should do with a delivery after handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed (including domain-level failures recorded in the result).
    Ack,
    /// Transient failure; redeliver later.
    Requeue,
    /// The payload can never succeed; drop or dead-letter it.
    Reject,
}

#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &str;

    async fn handle(&self, routing_key: &str, payload: &[u8]) -> Delivery;
}
