//! AES-256-GCM adapter: Implementation of SymmetricCipher.
//!
//! # Security
//!
//! - AES-256-GCM provides authenticated encryption (AEAD), so a wrong key or
//!   a tampered blob fails the tag check instead of yielding garbage
//! - Random 96-bit nonce per encryption
//! - Passphrase keys are stretched with Argon2id (see `domain::kdf`)

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::domain::kdf::{self, KdfParams};
use crate::domain::{CryptoError, DecryptionKey, EncryptedBlob, IV_LEN, KEY_LEN};
use crate::ports::SymmetricCipher;

/// AES-256-GCM record cipher.
#[derive(Debug, Clone, Default)]
pub struct AesGcmCipher {
    kdf_params: KdfParams,
}

impl AesGcmCipher {
    /// Create a cipher with the default Argon2id cost.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cipher with a specific Argon2id cost for new passphrase blobs.
    #[must_use]
    pub fn with_kdf_params(kdf_params: KdfParams) -> Self {
        Self { kdf_params }
    }

    fn cipher_for(key: &[u8; KEY_LEN]) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }
}

impl SymmetricCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], key: &DecryptionKey) -> Result<EncryptedBlob, CryptoError> {
        let (key_bytes, kdf_header) = match key.raw_bytes() {
            Some(raw) => (raw, None),
            None => {
                let header = self.kdf_params.new_header();
                (kdf::derive_key(key.expose(), &header)?, Some(header))
            }
        };

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Self::cipher_for(&key_bytes)?
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(EncryptedBlob {
            iv,
            data: ciphertext,
            kdf: kdf_header,
        })
    }

    fn decrypt(
        &self,
        blob: &EncryptedBlob,
        key: &DecryptionKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let key_bytes = match &blob.kdf {
            Some(header) => kdf::derive_key(key.expose(), header)
                .map_err(|_| CryptoError::DecryptionFailed)?,
            // A passphrase can never match a blob sealed under a raw key.
            None => key.raw_bytes().ok_or(CryptoError::DecryptionFailed)?,
        };

        Self::cipher_for(&key_bytes)?
            .decrypt(Nonce::from_slice(&blob.iv), blob.data.as_ref())
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_KEY: &str = "8f1c2b3a4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8";

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::with_kdf_params(KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
    }

    fn key(s: &str) -> DecryptionKey {
        DecryptionKey::parse(s).expect("Valid key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_raw_key() {
        let plaintext = b"HbA1c 6.1%, fasting glucose 118 mg/dL";
        let blob = cipher().encrypt(plaintext, &key(RAW_KEY)).expect("Should encrypt");
        assert!(blob.kdf.is_none());

        let decrypted = cipher().decrypt(&blob, &key(RAW_KEY)).expect("Should decrypt");
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_passphrase() {
        let plaintext = b"Penicillin allergy";
        let blob = cipher().encrypt(plaintext, &key("k1")).expect("Should encrypt");
        assert!(blob.kdf.is_some());

        let decrypted = cipher().decrypt(&blob, &key("k1")).expect("Should decrypt");
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let blob = cipher().encrypt(b"", &key(RAW_KEY)).expect("Should encrypt");
        let decrypted = cipher().decrypt(&blob, &key(RAW_KEY)).expect("Should decrypt");
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = cipher().encrypt(b"secret", &key("k1")).expect("Should encrypt");
        assert!(matches!(
            cipher().decrypt(&blob, &key("k2")),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(matches!(
            cipher().decrypt(&blob, &key(RAW_KEY)),
            Err(CryptoError::DecryptionFailed)
        ));

        let raw_blob = cipher().encrypt(b"secret", &key(RAW_KEY)).expect("Should encrypt");
        assert!(matches!(
            cipher().decrypt(&raw_blob, &key("k1")),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let mut blob = cipher().encrypt(b"secret", &key(RAW_KEY)).expect("Should encrypt");
        blob.data[0] ^= 0x01;
        assert!(matches!(
            cipher().decrypt(&blob, &key(RAW_KEY)),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_hostile_kdf_header_is_decryption_failure() {
        let mut blob = cipher().encrypt(b"secret", &key("k1")).expect("Should encrypt");
        if let Some(header) = blob.kdf.as_mut() {
            header.m = u32::MAX;
        }
        assert!(matches!(
            cipher().decrypt(&blob, &key("k1")),
            Err(CryptoError::DecryptionFailed)
        ));

        let restored = EncryptedBlob::from_value(serde_json::json!({
            "iv": "000102030405060708090a0b",
            "data": "abcd",
            "kdf": { "alg": "argon2id", "salt": "00", "m": 4294967295u32, "t": 1, "p": 1 }
        }))
        .expect("Should parse");
        assert!(matches!(
            cipher().decrypt(&restored, &key("k1")),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let b1 = cipher().encrypt(b"same", &key(RAW_KEY)).expect("Should encrypt");
        let b2 = cipher().encrypt(b"same", &key(RAW_KEY)).expect("Should encrypt");
        assert_ne!(b1.iv, b2.iv);
        assert_ne!(b1.data, b2.data);
    }

    #[test]
    fn test_blob_survives_wire_format() {
        let blob = cipher().encrypt(b"vitals", &key("k1")).expect("Should encrypt");
        let restored =
            EncryptedBlob::from_bytes(&blob.to_bytes().expect("Should encode")).expect("Should parse");
        let decrypted = cipher().decrypt(&restored, &key("k1")).expect("Should decrypt");
        assert_eq!(decrypted.as_slice(), b"vitals");
    }
}
