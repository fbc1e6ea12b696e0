//! Ledger port: Trait for the medical-records contract.
//!
//! The contract is a remote collaborator. Access control, roles and record
//! registration are enforced by the ledger itself; this trait only carries
//! the calls and their results.

use std::future::Future;

use crate::domain::{
    AccessToken, Address, ContentId, EncryptedBlob, NewRecord, PatientDetails, RawLedgerRecord,
    Receipt,
};

/// Errors from the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The contract refused the call (missing role, not admin, revert).
    #[error("Ledger rejected the call: {0}")]
    Rejected(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Where a patient's encrypted medical profile lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientDataPointer {
    /// Blob stored in the content store
    Content(ContentId),
    /// Blob carried inline in the ledger response
    Inline(EncryptedBlob),
}

/// Trait for ledger operations.
///
/// Calls that change state take the sending account as `from`.
pub trait Ledger: Send + Sync {
    /// Check an access token for a subject.
    ///
    /// Returns `Ok(false)` when access is not granted; errors are reserved
    /// for transport and protocol failures.
    fn validate_access(
        &self,
        subject: &Address,
        token: &AccessToken,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Issue a short-lived access token to `from` (emitted as `AccessGranted`).
    fn generate_access_token(
        &self,
        from: &Address,
    ) -> impl Future<Output = Result<AccessToken, LedgerError>> + Send;

    /// Pointer to a patient's encrypted medical profile, if any.
    fn patient_data(
        &self,
        patient: &Address,
    ) -> impl Future<Output = Result<Option<PatientDataPointer>, LedgerError>> + Send;

    /// Record the pointer to `from`'s own encrypted medical profile.
    fn set_patient_data(
        &self,
        from: &Address,
        content_id: &ContentId,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;

    /// Register a record pointer. The ledger rejects callers without the doctor role.
    fn add_record(
        &self,
        from: &Address,
        record: &NewRecord,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;

    /// Records for a patient in ledger insertion order.
    fn patient_records(
        &self,
        patient: &Address,
    ) -> impl Future<Output = Result<Vec<RawLedgerRecord>, LedgerError>> + Send;

    /// Details of the calling patient, with records nested inside.
    fn patient_details(
        &self,
        from: &Address,
    ) -> impl Future<Output = Result<PatientDetails, LedgerError>> + Send;

    /// A single record by id.
    fn record(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<RawLedgerRecord>, LedgerError>> + Send;

    /// Whether an address holds the doctor role.
    fn is_doctor(&self, address: &Address)
        -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Grant the doctor role. Admin only.
    fn register_doctor(
        &self,
        from: &Address,
        doctor: &Address,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;
}
