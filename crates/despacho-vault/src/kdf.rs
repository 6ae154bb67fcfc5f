// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation from the vault passphrase.

use despacho_config::model::VaultConfig;
use despacho_core::DespachoError;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters, stored next to the wrapped master key so a
/// vault stays unlockable after the configured defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&VaultConfig> for KdfParams {
    fn from(config: &VaultConfig) -> Self {
        Self {
            memory_cost: config.kdf_memory_cost,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

impl KdfParams {
    /// Derive a 32-byte wrapping key, zeroed on drop.
    pub fn derive(
        &self,
        passphrase: &[u8],
        salt: &[u8; SALT_LEN],
    ) -> Result<Zeroizing<[u8; 32]>, DespachoError> {
        let params = argon2::Params::new(
            self.memory_cost,
            self.iterations,
            self.parallelism,
            Some(32),
        )
        .map_err(|e| DespachoError::Vault(format!("invalid Argon2id parameters: {e}")))?;
        let argon2 =
            argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(passphrase, salt, output.as_mut())
            .map_err(|e| DespachoError::Vault(format!("Argon2id key derivation failed: {e}")))?;
        Ok(output)
    }
}
