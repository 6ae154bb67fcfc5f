// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `despacho credentials` subcommands and vault opening shared with `serve`.

use std::sync::Arc;

use despacho_config::model::DespachoConfig;
use despacho_core::{DespachoError, WhatsAppCredentials};
use despacho_storage::SqliteStorage;
use despacho_vault::{Vault, VaultCredentialStore};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

/// Environment variable read by `credentials set` before prompting.
pub const TOKEN_ENV_VAR: &str = "DESPACHO_WHATSAPP_TOKEN";

/// Open storage (running migrations) for a one-shot command.
pub async fn open_storage(config: &DespachoConfig) -> Result<Arc<SqliteStorage>, DespachoError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    Ok(storage)
}

/// Unlock the vault, creating it when `create` is set and none exists yet.
pub async fn open_vault(
    storage: &SqliteStorage,
    config: &DespachoConfig,
    create: bool,
) -> Result<Arc<Vault>, DespachoError> {
    let conn = storage.database()?.connection().clone();
    let vault = if Vault::exists(&conn).await? {
        let passphrase = despacho_vault::get_vault_passphrase()?;
        Vault::unlock(conn, &passphrase).await?
    } else if create {
        info!("no vault found, creating one");
        let passphrase = despacho_vault::get_vault_passphrase_with_confirm()?;
        Vault::create(conn, &passphrase, &config.vault).await?
    } else {
        return Err(DespachoError::Vault(
            "no vault found; run `despacho credentials set` first".to_string(),
        ));
    };
    Ok(Arc::new(vault))
}

fn read_token() -> Result<SecretString, DespachoError> {
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        if !token.is_empty() {
            return Ok(SecretString::from(token));
        }
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(DespachoError::Config(format!(
            "no access token provided; set {TOKEN_ENV_VAR} or run interactively"
        )));
    }
    eprint!("WhatsApp access token: ");
    let token = rpassword::read_password()
        .map_err(|e| DespachoError::Config(format!("failed to read access token: {e}")))?;
    if token.is_empty() {
        return Err(DespachoError::Config("empty access token".to_string()));
    }
    Ok(SecretString::from(token))
}

/// `despacho credentials set`
pub async fn run_set(
    config: &DespachoConfig,
    business_id: i64,
    phone_number_id: &str,
) -> Result<(), DespachoError> {
    if phone_number_id.trim().is_empty() {
        return Err(DespachoError::Config("phone number id must not be empty".to_string()));
    }
    let token = read_token()?;

    let storage = open_storage(config).await?;
    let vault = open_vault(&storage, config, true).await?;
    let store = VaultCredentialStore::new(vault, storage);
    store
        .store_whatsapp_credentials(
            business_id,
            &WhatsAppCredentials::new(phone_number_id.trim(), token.expose_secret()),
        )
        .await?;

    println!("stored WhatsApp credentials for business {business_id}");
    Ok(())
}

/// `despacho credentials delete`
pub async fn run_delete(config: &DespachoConfig, business_id: i64) -> Result<(), DespachoError> {
    let storage = open_storage(config).await?;
    let vault = open_vault(&storage, config, false).await?;
    let store = VaultCredentialStore::new(vault, storage);
    if store.delete_whatsapp_credentials(business_id).await? {
        println!("deleted WhatsApp credentials for business {business_id}");
    } else {
        println!("no WhatsApp credentials stored for business {business_id}");
    }
    Ok(())
}

/// `despacho vault change-passphrase`
pub async fn run_change_passphrase(config: &DespachoConfig) -> Result<(), DespachoError> {
    let storage = open_storage(config).await?;
    let vault = open_vault(&storage, config, false).await?;
    let passphrase = despacho_vault::get_new_vault_passphrase()?;
    vault.change_passphrase(&passphrase, &config.vault).await?;
    println!("vault passphrase changed");
    Ok(())
}

/// `despacho credentials list`
pub async fn run_list(config: &DespachoConfig) -> Result<(), DespachoError> {
    let storage = open_storage(config).await?;
    let vault = open_vault(&storage, config, false).await?;
    let secrets = vault.list_secrets().await?;
    if secrets.is_empty() {
        println!("no credentials stored");
        return Ok(());
    }
    for (name, preview) in secrets {
        println!("{name:<48} {preview}");
    }
    Ok(())
}
