//! Domain layer: Core business types and logic.
//!
//! Plain Rust types with strict validation; no I/O happens here.

mod consultation;
mod crypto;
pub mod kdf;
pub mod ledger_record;
mod record;
pub mod redaction;
mod session;

pub use consultation::{AccessToken, MedicalPayload, SanitizedMedicalContext};
pub use crypto::{CryptoError, DecryptionKey, EncryptedBlob, IV_LEN, KEY_LEN};
pub use ledger_record::{MalformedRecordShape, PatientDetails, RawLedgerRecord, StructuredRecord};
pub use record::{
    Address, ContentId, MedicalRecord, NewRecord, Receipt, RecordMetadata, RecordReceipt,
    RecordSubmission, RecordType, UNKNOWN_DATE, UNKNOWN_DOCTOR,
};
pub use session::SessionContext;
