// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CredentialStore`] backed by the vault and the catalog projection.
//!
//! Secret names are `whatsapp.<business_id>.phone_number_id` and
//! `whatsapp.<business_id>.access_token`.

use std::sync::Arc;

use async_trait::async_trait;
use despacho_core::{CatalogRepository, CredentialStore, DespachoError, WhatsAppCredentials};
use secrecy::ExposeSecret;

use crate::vault::Vault;

fn phone_number_id_key(business_id: i64) -> String {
    format!("whatsapp.{business_id}.phone_number_id")
}

fn access_token_key(business_id: i64) -> String {
    format!("whatsapp.{business_id}.access_token")
}

pub struct VaultCredentialStore {
    vault: Arc<Vault>,
    catalog: Arc<dyn CatalogRepository>,
}

impl VaultCredentialStore {
    pub fn new(vault: Arc<Vault>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { vault, catalog }
    }

    /// Store (or replace) the WhatsApp credentials of a business.
    pub async fn store_whatsapp_credentials(
        &self,
        business_id: i64,
        credentials: &WhatsAppCredentials,
    ) -> Result<(), DespachoError> {
        self.vault
            .store_secret(&phone_number_id_key(business_id), &credentials.phone_number_id)
            .await?;
        self.vault
            .store_secret(
                &access_token_key(business_id),
                credentials.access_token.expose_secret(),
            )
            .await?;
        tracing::info!(business_id, "whatsapp credentials stored");
        Ok(())
    }

    /// Remove both secrets of a business. Returns `false` if none existed.
    pub async fn delete_whatsapp_credentials(&self, business_id: i64) -> Result<bool, DespachoError> {
        let id_deleted = self
            .vault
            .delete_secret(&phone_number_id_key(business_id))
            .await?;
        let token_deleted = self
            .vault
            .delete_secret(&access_token_key(business_id))
            .await?;
        if id_deleted || token_deleted {
            tracing::info!(business_id, "whatsapp credentials deleted");
        }
        Ok(id_deleted || token_deleted)
    }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn whatsapp_credentials(
        &self,
        business_id: i64,
    ) -> Result<WhatsAppCredentials, DespachoError> {
        let phone_number_id = self
            .vault
            .retrieve_secret(&phone_number_id_key(business_id))
            .await?;
        let access_token = self
            .vault
            .retrieve_secret(&access_token_key(business_id))
            .await?;
        match (phone_number_id, access_token) {
            (Some(id), Some(token)) => Ok(WhatsAppCredentials {
                phone_number_id: id.expose_secret().to_string(),
                access_token: token,
            }),
            _ => Err(DespachoError::CredentialsNotFound(business_id)),
        }
    }

    async fn default_warehouse(&self, business_id: i64) -> Result<Option<i64>, DespachoError> {
        Ok(self
            .catalog
            .default_warehouse(business_id)
            .await?
            .map(|w| w.id))
    }
}
