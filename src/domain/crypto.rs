//! Cryptographic types for record encryption.
//!
//! # Memory Security
//!
//! Key material is held in `Zeroizing` buffers so it is erased when the
//! owning value is dropped. `Debug` implementations never print key bytes
//! or ciphertext.

use base64::engine::general_purpose;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::kdf::KdfHeader;

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-GCM initialization vector in bytes.
pub const IV_LEN: usize = 12;

/// Error type for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed - invalid key or corrupted data")]
    DecryptionFailed,
}

/// A user-supplied record key.
///
/// Exists only for the duration of one operation. It is never persisted and
/// never logged; use [`DecryptionKey::fingerprint`] to identify it in logs.
///
/// Two encodings are accepted:
/// - exactly 64 hex digits (optionally `0x`-prefixed): a raw AES-256 key
/// - anything else non-empty: a passphrase, stretched with Argon2id
#[derive(Clone)]
pub struct DecryptionKey {
    secret: Zeroizing<String>,
}

impl DecryptionKey {
    /// Parse a key from user input.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the key is empty or carries
    /// a `0x` prefix without exactly 64 hex digits after it.
    pub fn parse(input: &str) -> Result<Self, CryptoError> {
        if input.is_empty() {
            return Err(CryptoError::InvalidKeyFormat("key is empty".to_string()));
        }

        if let Some(rest) = input.strip_prefix("0x") {
            if rest.len() != KEY_LEN * 2 || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(CryptoError::InvalidKeyFormat(format!(
                    "0x-prefixed keys must be {} hex digits",
                    KEY_LEN * 2
                )));
            }
        }

        Ok(Self {
            secret: Zeroizing::new(input.to_string()),
        })
    }

    /// Raw AES-256 key bytes, if the key was given in hex.
    #[must_use]
    pub fn raw_bytes(&self) -> Option<Zeroizing<[u8; KEY_LEN]>> {
        let hex_part = self.secret.strip_prefix("0x").unwrap_or(&self.secret);
        if hex_part.len() != KEY_LEN * 2 {
            return None;
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        hex::decode_to_slice(hex_part, key.as_mut_slice()).ok()?;
        Some(key)
    }

    /// Whether this key is a passphrase that needs stretching.
    #[must_use]
    pub fn is_passphrase(&self) -> bool {
        self.raw_bytes().is_none()
    }

    /// Secret text, for key derivation only.
    pub(crate) fn expose(&self) -> &str {
        &self.secret
    }

    /// Non-secret identifier for audit logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(self.secret.as_bytes())
    }
}

// Intentionally NOT exposing the secret in Debug output
impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("fingerprint", &self.fingerprint())
            .field("passphrase", &self.is_passphrase())
            .finish()
    }
}

/// Ciphertext plus everything needed to decrypt it except the key.
///
/// Wire format (JSON): `{"iv": hex, "data": hex, "kdf": {...}?}`. On input
/// `data` is accepted as hex or standard base64.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub iv: [u8; IV_LEN],
    pub data: Vec<u8>,
    /// Present when the key was a passphrase.
    pub kdf: Option<KdfHeader>,
}

#[derive(Serialize, Deserialize)]
struct BlobWire {
    iv: String,
    data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kdf: Option<KdfHeader>,
}

impl EncryptedBlob {
    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        let wire = BlobWire {
            iv: hex::encode(self.iv),
            data: hex::encode(&self.data),
            kdf: self.kdf.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Parse the JSON wire format.
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailed` if the bytes are not a valid blob;
    /// a corrupted blob is indistinguishable from one encrypted under another key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let wire: BlobWire =
            serde_json::from_slice(bytes).map_err(|_| CryptoError::DecryptionFailed)?;
        Self::from_wire(wire)
    }

    /// Parse an already-decoded JSON value, e.g. an inline blob from the ledger.
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailed` if the value is not a valid blob.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CryptoError> {
        let wire: BlobWire =
            serde_json::from_value(value).map_err(|_| CryptoError::DecryptionFailed)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: BlobWire) -> Result<Self, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(&wire.iv, &mut iv).map_err(|_| CryptoError::DecryptionFailed)?;

        let data = hex::decode(&wire.data)
            .or_else(|_| general_purpose::STANDARD.decode(&wire.data))
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok(Self {
            iv,
            data,
            kdf: wire.kdf,
        })
    }

    /// Get the size of the ciphertext in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("size_bytes", &self.data.len())
            .field("passphrase_kdf", &self.kdf.is_some())
            .finish()
    }
}

/// Compute a fingerprint for key identification using SHA-256.
///
/// Only the first 8 bytes of the digest are kept; the output is a hash of the
/// key, never key material.
fn compute_fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
