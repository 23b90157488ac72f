// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Custodial key generation and encryption at rest.
//!
//! Deposit-address private keys never touch disk in the clear: they are
//! sealed with AES-256-GCM under a process-wide key the moment they are
//! generated, and only unsealed transiently inside a signing scope. The
//! stored blob is `nonce ‖ ciphertext ‖ tag`, hex-encoded, with a fresh
//! random nonce per encryption.

use alloy::signers::local::PrivateKeySigner;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Key custody errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("failed to encrypt key material")]
    EncryptionFailed,

    /// Tampered ciphertext, wrong key, or undersized blob.
    #[error("failed to decrypt key material")]
    DecryptionFailed,

    #[error("decrypted bytes are not a valid private key")]
    InvalidKeyMaterial,
}

/// A freshly minted custodial keypair.
#[derive(Debug, Clone)]
pub struct GeneratedAddress {
    /// On-chain address, lowercase hex.
    pub address: String,
    /// Sealed private key, hex.
    pub encrypted_private_key: String,
}

/// Holds the process-wide AEAD key and mints/unseals custodial keys.
pub struct KeyCustody {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl KeyCustody {
    /// Build from the 32-byte symmetric key loaded at startup.
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let unbound =
            UnboundKey::new(&AES_256_GCM, key_bytes).expect("AES-256-GCM key is 32 bytes");
        Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        }
    }

    /// Generate a fresh keypair and seal the private key.
    pub fn generate(&self) -> Result<GeneratedAddress, CustodyError> {
        let signer = PrivateKeySigner::random();
        let address = format!("{:#x}", signer.address());
        let encrypted_private_key = self.encrypt(signer.to_bytes().as_slice())?;

        Ok(GeneratedAddress {
            address,
            encrypted_private_key,
        })
    }

    /// Seal raw key material. Returns hex of `nonce ‖ ciphertext ‖ tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CustodyError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CustodyError::EncryptionFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CustodyError::EncryptionFailed)?;

        let mut blob = nonce_bytes.to_vec();
        blob.extend_from_slice(&in_out);
        Ok(alloy::hex::encode(blob))
    }

    /// Unseal raw key material. The caller must not persist or log the
    /// result; it is meant to live only inside a signing scope.
    pub fn decrypt(&self, encrypted_hex: &str) -> Result<Vec<u8>, CustodyError> {
        let blob =
            alloy::hex::decode(encrypted_hex).map_err(|_| CustodyError::DecryptionFailed)?;

        if blob.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CustodyError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CustodyError::DecryptionFailed)?;

        let mut buf = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| CustodyError::DecryptionFailed)?;

        Ok(plaintext.to_vec())
    }

    /// Unseal directly into a signer, for scoped signing operations.
    pub fn decrypt_signer(&self, encrypted_hex: &str) -> Result<PrivateKeySigner, CustodyError> {
        let bytes = self.decrypt(encrypted_hex)?;
        PrivateKeySigner::from_slice(&bytes).map_err(|_| CustodyError::InvalidKeyMaterial)
    }
}
