//! Passphrase key derivation for record encryption.
//!
//! Passphrase keys are stretched with Argon2id into a 256-bit AES key. The
//! salt and cost parameters travel with the ciphertext in a [`KdfHeader`], so
//! changing the configured cost never orphans existing blobs.
//!
//! # Security
//!
//! - Argon2id (memory-hard, resistant to GPU/ASIC attacks)
//! - Random 128-bit salt per encryption

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::crypto::{CryptoError, KEY_LEN};

const SALT_LEN: usize = 16;
const ALG_ARGON2ID: &str = "argon2id";

/// Upper bounds accepted from a stored header (1 GiB of memory).
pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;
pub const MAX_ITERATIONS: u32 = 10;
pub const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters for new encryptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 47104,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Build a fresh header with a random salt.
    #[must_use]
    pub fn new_header(&self) -> KdfHeader {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        KdfHeader {
            alg: ALG_ARGON2ID.to_string(),
            salt: hex::encode(salt),
            m: self.memory_kib,
            t: self.iterations,
            p: self.parallelism,
        }
    }
}

/// KDF parameters recorded alongside a passphrase-encrypted blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfHeader {
    pub alg: String,
    /// Hex-encoded salt
    pub salt: String,
    pub m: u32,
    pub t: u32,
    pub p: u32,
}

/// Derive a 256-bit key from a passphrase using the header's parameters.
///
/// Headers are read back from untrusted storage, so the cost parameters are
/// bounded before any memory is allocated.
///
/// # Errors
/// Returns `CryptoError::KeyDerivation` if the header is unusable or its
/// cost exceeds the bounds above.
pub fn derive_key(
    passphrase: &str,
    header: &KdfHeader,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    if header.alg != ALG_ARGON2ID {
        return Err(CryptoError::KeyDerivation(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    if header.m > MAX_MEMORY_KIB || header.t > MAX_ITERATIONS || header.p > MAX_PARALLELISM {
        return Err(CryptoError::KeyDerivation(format!(
            "cost out of range (m={}, t={}, p={})",
            header.m, header.t, header.p
        )));
    }

    let salt = hex::decode(&header.salt)
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid salt: {e}")))?;
    if salt.len() != SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt must be {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    let params = Params::new(header.m, header.t, header.p, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt, key.as_mut_slice())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derivation_is_deterministic_per_header() {
        let header = cheap().new_header();
        let k1 = derive_key("correct-horse-battery-staple", &header).expect("Should derive");
        let k2 = derive_key("correct-horse-battery-staple", &header).expect("Should derive");
        assert_eq!(*k1, *k2);

        let other = derive_key("wrong-password", &header).expect("Should derive");
        assert_ne!(*k1, *other);
    }

    #[test]
    fn test_fresh_salt_per_header() {
        let h1 = cheap().new_header();
        let h2 = cheap().new_header();
        assert_ne!(h1.salt, h2.salt);
        assert_eq!(h1.salt.len(), SALT_LEN * 2);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut header = cheap().new_header();
        header.alg = "scrypt".to_string();
        assert!(matches!(
            derive_key("pw", &header),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_oversized_cost_rejected_before_hashing() {
        for (m, t, p) in [(u32::MAX, 1, 1), (1024, MAX_ITERATIONS + 1, 1), (1024, 1, 64)] {
            let mut header = cheap().new_header();
            header.m = m;
            header.t = t;
            header.p = p;
            assert!(matches!(
                derive_key("pw", &header),
                Err(CryptoError::KeyDerivation(_))
            ));
        }
    }

    #[test]
    fn test_short_salt_rejected() {
        let mut header = cheap().new_header();
        header.salt = "abcd".to_string();
        assert!(matches!(
            derive_key("pw", &header),
            Err(CryptoError::KeyDerivation(_))
        ));
    }
}
