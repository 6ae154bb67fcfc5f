// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between despacho components.
//!
//! Every trait uses `#[async_trait]` so implementations can be held as
//! `Arc<dyn Trait>` and swapped for recording fakes in tests.

pub mod adapter;
pub mod cache;
pub mod catalog;
pub mod conversation;
pub mod credentials;
pub mod delivery;
pub mod ledger;
pub mod publish;

pub use adapter::Adapter;
pub use cache::InventoryCache;
pub use catalog::CatalogRepository;
pub use conversation::{ConversationStore, MessageLogStore};
pub use credentials::CredentialStore;
pub use delivery::{Delivery, DeliveryHandler};
pub use ledger::StockLedger;
pub use publish::{ConversationEventPublisher, InventoryEventPublisher, SyncPublisher};
