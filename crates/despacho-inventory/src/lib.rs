// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory engine for despacho.
//!
//! [`InventoryOrchestrator`] turns order-level requests into ledger
//! transitions. [`CachedLedger`] keeps the [`MemoryInventoryCache`] honest
//! after every commit and [`InventoryReader`] reads through it.
//! [`OrderEventHandler`] feeds the orchestrator from the broker.

pub mod cache;
pub mod consumer;
pub mod ledger;
pub mod orchestrator;
pub mod reader;

pub use cache::MemoryInventoryCache;
pub use consumer::{OrderEventHandler, operation_for};
pub use ledger::CachedLedger;
pub use orchestrator::InventoryOrchestrator;
pub use reader::InventoryReader;
