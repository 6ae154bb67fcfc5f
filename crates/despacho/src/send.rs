// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `despacho send-confirmation`: start a cash-on-delivery confirmation
//! conversation for one order.

use std::collections::HashMap;
use std::sync::Arc;

use despacho_config::model::DespachoConfig;
use despacho_conversation::{MessageSender, SendReceipt};
use despacho_core::DespachoError;
use despacho_vault::VaultCredentialStore;
use despacho_whatsapp::{CloudApiClient, templates};

use crate::credentials::{open_storage, open_vault};

/// Order details substituted into `confirmacion_pedido_contraentrega`.
#[derive(Debug, Clone, clap::Args)]
pub struct ConfirmationArgs {
    #[arg(long)]
    pub business_id: i64,
    /// Customer phone, any common format.
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub order: String,
    /// Customer name.
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub store: String,
    #[arg(long)]
    pub address: String,
    /// Product summary line, e.g. "2x Camiseta, 1x Gorra".
    #[arg(long)]
    pub products: String,
}

impl ConfirmationArgs {
    /// Positional template variables in catalog order.
    pub fn vars(&self) -> HashMap<String, String> {
        [
            &self.name,
            &self.store,
            &self.order,
            &self.address,
            &self.products,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, value)| ((i + 1).to_string(), value.clone()))
        .collect()
    }
}

pub async fn run_send_confirmation(
    config: &DespachoConfig,
    args: &ConfirmationArgs,
) -> Result<SendReceipt, DespachoError> {
    let storage = open_storage(config).await?;
    let vault = open_vault(&storage, config, false).await?;
    let credentials = Arc::new(VaultCredentialStore::new(vault, storage.clone()));
    let client = Arc::new(CloudApiClient::new(&config.whatsapp)?);
    let sender = MessageSender::new(
        client,
        storage.clone(),
        storage,
        credentials,
        chrono::Duration::hours(config.whatsapp.conversation_ttl_hours),
    );

    let receipt = sender
        .send_template(
            templates::CONFIRMACION_PEDIDO,
            &args.phone,
            &args.vars(),
            &args.order,
            args.business_id,
        )
        .await?;
    tracing::info!(
        order = %args.order,
        conversation_id = %receipt.conversation_id,
        message_id = %receipt.message_id,
        "confirmation sent"
    );
    Ok(receipt)
}
