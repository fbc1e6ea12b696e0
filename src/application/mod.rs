//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the record workflow and the consultation gateway.

mod consultation;
mod records;

pub use consultation::ConsultationGateway;
pub use records::RecordWorkflow;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::domain::{CryptoError, DecryptionKey, EncryptedBlob};
use crate::ports::SymmetricCipher;

/// Encrypt on the blocking pool; passphrase keys cost an Argon2id derivation.
async fn seal<C>(
    cipher: &Arc<C>,
    plaintext: Zeroizing<Vec<u8>>,
    key: &DecryptionKey,
) -> Result<EncryptedBlob, CryptoError>
where
    C: SymmetricCipher + 'static,
{
    let cipher = Arc::clone(cipher);
    let key = key.clone();
    tokio::task::spawn_blocking(move || cipher.encrypt(&plaintext, &key))
        .await
        .map_err(|e| CryptoError::Encryption(format!("cipher task failed: {e}")))?
}

/// Decrypt on the blocking pool.
async fn open<C>(
    cipher: &Arc<C>,
    blob: EncryptedBlob,
    key: &DecryptionKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError>
where
    C: SymmetricCipher + 'static,
{
    let cipher = Arc::clone(cipher);
    let key = key.clone();
    tokio::task::spawn_blocking(move || cipher.decrypt(&blob, &key))
        .await
        .map_err(|_| CryptoError::DecryptionFailed)?
}
