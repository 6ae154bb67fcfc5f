// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing with random 96-bit nonces.
//!
//! Every [`seal`] draws a fresh nonce from the system CSPRNG. A nonce must
//! never be reused under the same key.

use despacho_core::DespachoError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

pub const NONCE_LEN: usize = 12;

/// Ciphertext (with the 16-byte tag appended) and the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl Sealed {
    /// Rebuild from stored columns, rejecting a nonce of the wrong length.
    pub fn from_parts(ciphertext: Vec<u8>, nonce: Vec<u8>) -> Result<Self, DespachoError> {
        let nonce = nonce
            .try_into()
            .map_err(|_| DespachoError::Vault("corrupted nonce (expected 12 bytes)".to_string()))?;
        Ok(Self { ciphertext, nonce })
    }
}

fn cipher(key: &[u8; 32]) -> Result<LessSafeKey, DespachoError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| DespachoError::Vault("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Fill an `N`-byte array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], DespachoError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| DespachoError::Vault("system random source unavailable".to_string()))?;
    Ok(out)
}

pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Sealed, DespachoError> {
    let nonce = random_bytes::<NONCE_LEN>()?;
    let mut in_out = plaintext.to_vec();
    cipher(key)?
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
        .map_err(|_| DespachoError::Vault("AES-256-GCM encryption failed".to_string()))?;
    Ok(Sealed {
        ciphertext: in_out,
        nonce,
    })
}

/// Decrypt and authenticate. Fails on a wrong key or tampered data.
pub fn open(key: &[u8; 32], sealed: &Sealed) -> Result<Vec<u8>, DespachoError> {
    let mut in_out = sealed.ciphertext.clone();
    let plaintext = cipher(key)?
        .open_in_place(
            Nonce::assume_unique_for_key(sealed.nonce),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| {
            DespachoError::Vault("decryption failed -- wrong key or corrupted data".to_string())
        })?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = random_bytes::<32>().unwrap();
        let sealed = seal(&key, b"EAAG-token").unwrap();
        assert_eq!(sealed.ciphertext.len(), "EAAG-token".len() + 16);
        assert_eq!(open(&key, &sealed).unwrap(), b"EAAG-token");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = random_bytes::<32>().unwrap();
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let key = random_bytes::<32>().unwrap();
        let mut sealed = seal(&key, b"secret").unwrap();
        assert!(open(&random_bytes::<32>().unwrap(), &sealed).is_err());

        sealed.ciphertext[0] ^= 0x01;
        assert!(open(&key, &sealed).is_err());
    }

    #[test]
    fn from_parts_checks_nonce_length() {
        assert!(Sealed::from_parts(vec![1, 2, 3], vec![0; 11]).is_err());
        assert!(Sealed::from_parts(vec![1, 2, 3], vec![0; 12]).is_ok());
    }
}
