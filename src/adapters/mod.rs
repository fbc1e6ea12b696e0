//! Adapters layer: Concrete implementations of ports.
//!
//! - `aead`: AES-256-GCM record cipher
//! - `ipfs`: IPFS HTTP API content store
//! - `sqlite`: SQLite content store for local use
//! - `rpc_ledger`: JSON-RPC client for the records contract
//! - `memory_ledger`: in-memory ledger for local runs and tests
//! - `openai`: chat-completions language model
//! - `sanitize`: redacting log writer

pub mod aead;
pub mod ipfs;
pub mod memory_ledger;
pub mod openai;
pub mod rpc_ledger;
pub mod sanitize;
pub mod sqlite;

pub use aead::AesGcmCipher;
pub use ipfs::IpfsContentStore;
pub use memory_ledger::InMemoryLedger;
pub use openai::{OpenAiConfig, OpenAiModel};
pub use rpc_ledger::JsonRpcLedger;
pub use sqlite::SqliteContentStore;

use crate::domain::ContentId;
use crate::ports::{ContentStore, StoreError};

/// Content store selected at startup.
pub enum ContentStoreBackend {
    Ipfs(IpfsContentStore),
    Sqlite(SqliteContentStore),
}

impl ContentStore for ContentStoreBackend {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        match self {
            Self::Ipfs(store) => store.put(bytes).await,
            Self::Sqlite(store) => store.put(bytes).await,
        }
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::Ipfs(store) => store.get(id).await,
            Self::Sqlite(store) => store.get(id).await,
        }
    }
}
