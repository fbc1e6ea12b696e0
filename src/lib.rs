//! # medledger
//!
//! Encrypted medical records anchored on a ledger, with a consultation
//! gateway that forwards a redacted clinical context to a language model.
//!
//! This crate provides:
//! - Client-side AES-256-GCM encryption of record files
//! - Content-addressed storage of ciphertext (IPFS or SQLite)
//! - A ledger client for roles, access tokens and record pointers
//! - An HTTP endpoint for AI health consultations
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (records, keys, blobs, consultation context)
//! - `ports`: Trait definitions for external collaborators
//! - `adapters`: Concrete implementations (AES-GCM, IPFS, SQLite, JSON-RPC, OpenAI)
//! - `application`: Record workflow and consultation gateway
//! - `api`: HTTP surface
//! - `config`: Environment configuration

pub mod adapters;
pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{Address, DecryptionKey, MedicalRecord, RecordType};

/// Result type for medledger operations
pub type Result<T> = std::result::Result<T, MedLedgerError>;

/// Main error type for medledger
#[derive(Debug, thiserror::Error)]
pub enum MedLedgerError {
    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Content store operation failed: {0}")]
    Store(#[from] ports::StoreError),

    #[error("Ledger operation failed: {0}")]
    Ledger(#[from] ports::LedgerError),

    #[error("Language model call failed: {0}")]
    Model(#[from] ports::ModelError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid medical payload: {0}")]
    InvalidPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
