// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait for components that own an external resource.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and lifecycle of an infrastructure adapter.
///
/// The gateway's `/health` endpoint aggregates these, and the binary calls
/// [`shutdown`](Adapter::shutdown) on each during graceful exit.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, DespachoError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), DespachoError>;
}
