//! Cipher port: Trait for symmetric record encryption.

use zeroize::Zeroizing;

use crate::domain::{CryptoError, DecryptionKey, EncryptedBlob};

/// Trait for symmetric encryption of record payloads.
///
/// Implementations provide:
/// - A fresh random IV per encryption
/// - Failure (never garbage) on a wrong key or a corrupted blob
pub trait SymmetricCipher: Send + Sync {
    /// Encrypt a payload under a caller-supplied key.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the key cannot be used,
    /// `CryptoError::Encryption` if encryption fails.
    fn encrypt(&self, plaintext: &[u8], key: &DecryptionKey) -> Result<EncryptedBlob, CryptoError>;

    /// Decrypt a blob produced by [`SymmetricCipher::encrypt`].
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailed` if the key is wrong or the
    /// blob is corrupted.
    fn decrypt(
        &self,
        blob: &EncryptedBlob,
        key: &DecryptionKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}
