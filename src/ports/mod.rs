//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (ledger, content store,
//! language model, cipher).

mod cipher;
mod content_store;
mod language_model;
mod ledger;

pub use cipher::SymmetricCipher;
pub use content_store::{ContentStore, StoreError};
pub use language_model::{LanguageModel, ModelError};
pub use ledger::{Ledger, LedgerError, PatientDataPointer};
