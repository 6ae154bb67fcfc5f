// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::types::WhatsAppCredentials;

/// Per-business settings that live outside the ledger: decrypted WhatsApp
/// credentials and the default warehouse.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `CREDENTIALS_NOT_FOUND` when the business has none stored.
    async fn whatsapp_credentials(
        &self,
        business_id: i64,
    ) -> Result<WhatsAppCredentials, DespachoError>;

    async fn default_warehouse(&self, business_id: i64) -> Result<Option<i64>, DespachoError>;
}
