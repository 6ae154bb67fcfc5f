// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for despacho.
//!
//! This crate provides the error taxonomy, domain entities, the pure ledger
//! arithmetic, and the trait seams that the storage, messaging, and broker
//! crates implement.

pub mod conversation;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{DespachoError, ErrorKind, WhatsAppApiError};
pub use types::{AdapterType, HealthStatus, WhatsAppCredentials};

pub use traits::{
    Adapter, CatalogRepository, ConversationEventPublisher, ConversationStore, CredentialStore,
    Delivery, DeliveryHandler, InventoryCache, InventoryEventPublisher, MessageLogStore,
    StockLedger, SyncPublisher,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_trait_seams_are_object_safe() {
        // Compiles only if every seam can be used behind `dyn`.
        fn _assert(
            _: Option<&dyn Adapter>,
            _: Option<&dyn CatalogRepository>,
            _: Option<&dyn ConversationEventPublisher>,
            _: Option<&dyn ConversationStore>,
            _: Option<&dyn CredentialStore>,
            _: Option<&dyn DeliveryHandler>,
            _: Option<&dyn InventoryCache>,
            _: Option<&dyn InventoryEventPublisher>,
            _: Option<&dyn MessageLogStore>,
            _: Option<&dyn StockLedger>,
            _: Option<&dyn SyncPublisher>,
        ) {
        }
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = WhatsAppCredentials::new("1234", "EAAG-secret-token");
        let debug = format!("{creds:?}");
        assert!(debug.contains("1234"));
        assert!(!debug.contains("EAAG-secret-token"));
    }

    #[test]
    fn health_status_serializes_with_detail() {
        let json = serde_json::to_value(HealthStatus::Degraded("slow".into())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["detail"], "slow");
        assert!(HealthStatus::Healthy.is_healthy());
    }
}
