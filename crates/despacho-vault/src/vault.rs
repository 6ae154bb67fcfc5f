// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault lifecycle: create, unlock, and secret CRUD.
//!
//! `vault_meta` holds four rows: the wrapped master key, its nonce, the
//! Argon2id salt, and the JSON-encoded [`KdfParams`]. Secrets live in
//! `vault_entries`, each sealed with the master key under its own nonce.

use std::collections::HashMap;

use despacho_config::model::VaultConfig;
use despacho_core::DespachoError;
use rusqlite::{OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{self, Sealed};
use crate::kdf::{KdfParams, SALT_LEN};

const META_WRAPPED_KEY: &str = "wrapped_master_key";
const META_NONCE: &str = "master_key_nonce";
const META_SALT: &str = "kdf_salt";
const META_PARAMS: &str = "kdf_params";

/// The unlocked vault. Debug output omits the master key.
pub struct Vault {
    master_key: Zeroizing<[u8; 32]>,
    conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl Vault {
    /// Whether a master key has been stored.
    pub async fn exists(conn: &tokio_rusqlite::Connection) -> Result<bool, DespachoError> {
        conn.call(|conn| -> Result<bool, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vault_meta WHERE key = ?1",
                params![META_WRAPPED_KEY],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
    }

    /// Create a vault with a fresh random master key wrapped by `passphrase`.
    pub async fn create(
        conn: tokio_rusqlite::Connection,
        passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<Self, DespachoError> {
        let master_key = Zeroizing::new(crypto::random_bytes::<32>()?);
        let vault = Self { master_key, conn };
        vault.wrap_master_key(passphrase, KdfParams::from(config)).await?;
        info!("vault created");
        Ok(vault)
    }

    /// Unlock an existing vault. A wrong passphrase fails authentication.
    pub async fn unlock(
        conn: tokio_rusqlite::Connection,
        passphrase: &SecretString,
    ) -> Result<Self, DespachoError> {
        let meta: HashMap<String, Vec<u8>> = conn
            .call(|conn| -> Result<HashMap<String, Vec<u8>>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT key, value FROM vault_meta")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let field = |name: &str| {
            meta.get(name)
                .cloned()
                .ok_or_else(|| DespachoError::Vault(format!("vault metadata is missing {name}")))
        };
        let params: KdfParams = serde_json::from_slice(&field(META_PARAMS)?)
            .map_err(|e| DespachoError::Vault(format!("corrupted KDF params: {e}")))?;
        let salt: [u8; SALT_LEN] = field(META_SALT)?
            .try_into()
            .map_err(|_| DespachoError::Vault("corrupted salt (expected 16 bytes)".to_string()))?;
        let wrapped = Sealed::from_parts(field(META_WRAPPED_KEY)?, field(META_NONCE)?)?;

        let wrapping_key = params.derive(passphrase.expose_secret().as_bytes(), &salt)?;
        let master_key = crypto::open(&wrapping_key, &wrapped).map_err(|_| {
            DespachoError::Vault("invalid passphrase or corrupted vault -- decryption failed".to_string())
        })?;
        let master_key: [u8; 32] = master_key.try_into().map_err(|_| {
            DespachoError::Vault("corrupted master key (expected 32 bytes)".to_string())
        })?;

        debug!("vault unlocked");
        Ok(Self {
            master_key: Zeroizing::new(master_key),
            conn,
        })
    }

    /// Re-wrap the master key under a new passphrase. Secrets are untouched.
    pub async fn change_passphrase(
        &self,
        new_passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<(), DespachoError> {
        self.wrap_master_key(new_passphrase, KdfParams::from(config)).await?;
        info!("vault passphrase changed");
        Ok(())
    }

    async fn wrap_master_key(
        &self,
        passphrase: &SecretString,
        params: KdfParams,
    ) -> Result<(), DespachoError> {
        let salt = crypto::random_bytes::<SALT_LEN>()?;
        let wrapping_key = params.derive(passphrase.expose_secret().as_bytes(), &salt)?;
        let wrapped = crypto::seal(&wrapping_key, &*self.master_key)?;
        let params_json = serde_json::to_vec(&params)
            .map_err(|e| DespachoError::Vault(format!("failed to encode KDF params: {e}")))?;

        let rows: [(&'static str, Vec<u8>); 4] = [
            (META_WRAPPED_KEY, wrapped.ciphertext),
            (META_NONCE, wrapped.nonce.to_vec()),
            (META_SALT, salt.to_vec()),
            (META_PARAMS, params_json),
        ];
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for (key, value) in &rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO vault_meta (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Encrypt and store a secret, replacing any previous value.
    pub async fn store_secret(&self, name: &str, plaintext: &str) -> Result<(), DespachoError> {
        let sealed = crypto::seal(&self.master_key, plaintext.as_bytes())?;
        let name_owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO vault_entries (name, ciphertext, nonce) VALUES (?1, ?2, ?3)
                     ON CONFLICT (name) DO UPDATE SET
                         ciphertext = excluded.ciphertext,
                         nonce = excluded.nonce,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![name_owned, sealed.ciphertext, sealed.nonce.to_vec()],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(name = %name, "secret stored in vault");
        Ok(())
    }

    /// Decrypt a secret, or `None` if it was never stored.
    pub async fn retrieve_secret(&self, name: &str) -> Result<Option<SecretString>, DespachoError> {
        let name = name.to_string();
        let entry = self
            .conn
            .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
                conn.query_row(
                    "SELECT ciphertext, nonce FROM vault_entries WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let Some((ciphertext, nonce)) = entry else {
            return Ok(None);
        };
        let plaintext = crypto::open(&self.master_key, &Sealed::from_parts(ciphertext, nonce)?)?;
        let value = String::from_utf8(plaintext)
            .map_err(|e| DespachoError::Vault(format!("decrypted value is not valid UTF-8: {e}")))?;
        Ok(Some(SecretString::from(value)))
    }

    /// Names of stored secrets with masked previews, sorted by name.
    pub async fn list_secrets(&self) -> Result<Vec<(String, String)>, DespachoError> {
        let names: Vec<String> = self
            .conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT name FROM vault_entries ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let mut listed = Vec::with_capacity(names.len());
        for name in names {
            let preview = match self.retrieve_secret(&name).await? {
                Some(secret) => mask_secret(secret.expose_secret()),
                None => "[missing]".to_string(),
            };
            listed.push((name, preview));
        }
        Ok(listed)
    }

    pub async fn delete_secret(&self, name: &str) -> Result<bool, DespachoError> {
        let name_owned = name.to_string();
        let deleted = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM vault_entries WHERE name = ?1", params![name_owned])
            })
            .await
            .map_err(map_tr_err)?;
        debug!(name = %name, deleted, "secret deleted from vault");
        Ok(deleted > 0)
    }
}

/// Mask a secret for display as `EAAG...9xQz`. Values under 10 characters
/// are fully masked.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DespachoError {
    DespachoError::Vault(format!("vault database error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use despacho_storage::Database;
    use tempfile::tempdir;

    fn fast_config() -> VaultConfig {
        VaultConfig {
            kdf_memory_cost: 8192,
            kdf_iterations: 1,
            kdf_parallelism: 1,
        }
    }

    async fn setup() -> (tokio_rusqlite::Connection, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db.connection().clone(), dir)
    }

    #[tokio::test]
    async fn create_store_and_unlock_again() {
        let (conn, _dir) = setup().await;
        let pass = SecretString::from("correcto");
        assert!(!Vault::exists(&conn).await.unwrap());

        let vault = Vault::create(conn.clone(), &pass, &fast_config()).await.unwrap();
        vault.store_secret("whatsapp.1.access_token", "EAAG-abcdef-123456").await.unwrap();
        drop(vault);

        assert!(Vault::exists(&conn).await.unwrap());
        let vault = Vault::unlock(conn, &pass).await.unwrap();
        let secret = vault.retrieve_secret("whatsapp.1.access_token").await.unwrap().unwrap();
        assert_eq!(secret.expose_secret(), "EAAG-abcdef-123456");
        assert!(vault.retrieve_secret("whatsapp.2.access_token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected() {
        let (conn, _dir) = setup().await;
        Vault::create(conn.clone(), &SecretString::from("correcto"), &fast_config())
            .await
            .unwrap();
        let err = Vault::unlock(conn, &SecretString::from("incorrecto")).await.unwrap_err();
        assert!(err.to_string().contains("invalid passphrase"));
    }

    #[tokio::test]
    async fn passphrase_change_keeps_secrets() {
        let (conn, _dir) = setup().await;
        let vault = Vault::create(conn.clone(), &SecretString::from("vieja"), &fast_config())
            .await
            .unwrap();
        vault.store_secret("k", "valor-secreto").await.unwrap();
        vault
            .change_passphrase(&SecretString::from("nueva"), &fast_config())
            .await
            .unwrap();

        assert!(Vault::unlock(conn.clone(), &SecretString::from("vieja")).await.is_err());
        let vault = Vault::unlock(conn, &SecretString::from("nueva")).await.unwrap();
        let value = vault.retrieve_secret("k").await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "valor-secreto");
    }

    #[tokio::test]
    async fn list_overwrite_and_delete() {
        let (conn, _dir) = setup().await;
        let vault = Vault::create(conn, &SecretString::from("p"), &fast_config()).await.unwrap();
        vault.store_secret("b", "short").await.unwrap();
        vault.store_secret("a", "EAAG-first-value").await.unwrap();
        vault.store_secret("a", "EAAG-second-value").await.unwrap();

        let listed = vault.list_secrets().await.unwrap();
        assert_eq!(
            listed,
            vec![
                ("a".to_string(), "EAAG...alue".to_string()),
                ("b".to_string(), "****".to_string()),
            ]
        );
        assert!(vault.delete_secret("a").await.unwrap());
        assert!(!vault.delete_secret("a").await.unwrap());
    }

    #[test]
    fn mask_secret_shows_only_edges() {
        assert_eq!(mask_secret("123456789"), "****");
        assert_eq!(mask_secret("EAAGxxxxxxxx9xQz"), "EAAG...9xQz");
    }
}
