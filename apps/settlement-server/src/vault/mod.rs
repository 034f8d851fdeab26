// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Vault
//!
//! Encrypts custodial signing material at rest with a server-held master key.
//!
//! ## Format
//!
//! ```text
//! base64( nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! The cipher is AES-256-GCM. Every call to [`KeyVault::encrypt`] draws a
//! fresh nonce from the system RNG, so a ciphertext is self-contained and two
//! encryptions of the same secret never produce the same output.
//!
//! ## Security
//!
//! - The master key is supplied once at startup and never logged
//! - Plaintext secrets never leave this module except through `decrypt`
//! - Decryption failures are never retried by callers

pub mod keys;

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

pub use keys::{generate_custodial_keypair, load_signer, GeneratedAccount};

/// Required master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Errors raised by the key vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("master key must be {MASTER_KEY_LEN} bytes, got {0}")]
    InvalidMasterKey(usize),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: {0}")]
    Decryption(&'static str),

    #[error("stored key does not match account address")]
    KeyMismatch,
}

/// Symmetric vault for custodial secrets.
pub struct KeyVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl KeyVault {
    /// Create a vault from the raw master key bytes.
    pub fn new(master_key: &[u8]) -> Result<Self, VaultError> {
        if master_key.len() != MASTER_KEY_LEN {
            return Err(VaultError::InvalidMasterKey(master_key.len()));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, master_key)
            .map_err(|_| VaultError::InvalidMasterKey(master_key.len()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Create a vault from a base64-encoded master key.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes =
            Base64::decode_vec(encoded.trim()).map_err(|_| VaultError::InvalidMasterKey(0))?;
        Self::new(&bytes)
    }

    /// Encrypt a secret. The output embeds its own nonce.
    pub fn encrypt(&self, secret: &[u8]) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::Encryption)?;

        let mut in_out = secret.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| VaultError::Encryption)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + in_out.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&in_out);
        Ok(Base64::encode_string(&payload))
    }

    /// Decrypt a ciphertext produced by [`KeyVault::encrypt`].
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, VaultError> {
        let payload = Base64::decode_vec(ciphertext.trim())
            .map_err(|_| VaultError::Decryption("invalid encoding"))?;

        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decryption("truncated payload"));
        }

        let (nonce_bytes, sealed) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| VaultError::Decryption("invalid nonce length"))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Decryption("authentication failed"))?;

        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_vault() -> KeyVault {
    KeyVault::new(&[7u8; MASTER_KEY_LEN]).expect("test vault")
}
