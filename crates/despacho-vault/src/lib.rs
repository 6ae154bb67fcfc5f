// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted credential vault for despacho.
//!
//! Each business's WhatsApp access token lives here, encrypted with a random
//! master key. The master key is itself wrapped by a key derived from the
//! operator passphrase with Argon2id, so changing the passphrase never
//! touches individual secrets.

pub mod credentials;
pub mod crypto;
pub mod kdf;
pub mod prompt;
pub mod vault;

pub use credentials::VaultCredentialStore;
pub use prompt::{
    get_new_vault_passphrase, get_vault_passphrase, get_vault_passphrase_with_confirm,
};
pub use vault::{Vault, mask_secret};
