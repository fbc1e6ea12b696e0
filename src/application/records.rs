//! Record workflow: the encrypt → store → register write path and the
//! list → fetch → decrypt read path.
//!
//! Steps run one after another with no retries. The ledger is the source of
//! truth for roles; the local doctor check only avoids encrypting and
//! uploading a file the ledger would refuse anyway.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::domain::ledger_record::normalize_all;
use crate::domain::{
    Address, DecryptionKey, EncryptedBlob, MedicalRecord, NewRecord, Receipt, RecordMetadata,
    RecordReceipt, RecordSubmission, RecordType, SessionContext, UNKNOWN_DOCTOR,
};
use crate::ports::{ContentStore, Ledger, LedgerError, SymmetricCipher};
use crate::{MedLedgerError, Result};

/// Service for adding, listing and reading encrypted records.
pub struct RecordWorkflow<C, S, L>
where
    C: SymmetricCipher,
    S: ContentStore,
    L: Ledger,
{
    session: SessionContext,
    cipher: Arc<C>,
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<C, S, L> RecordWorkflow<C, S, L>
where
    C: SymmetricCipher + 'static,
    S: ContentStore,
    L: Ledger,
{
    /// Create a workflow acting as `session.account`.
    pub fn new(session: SessionContext, cipher: Arc<C>, store: Arc<S>, ledger: Arc<L>) -> Self {
        Self {
            session,
            cipher,
            store,
            ledger,
        }
    }

    /// The acting account.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Encrypt a file, store the ciphertext and register it on the ledger.
    ///
    /// # Errors
    /// - `Validation` for empty doctor name, empty file or an unselectable type
    /// - `Ledger(Rejected)` if the session account is not a doctor
    /// - `Crypto`, `Store` or `Ledger` if the corresponding step fails
    pub async fn add_record(
        &self,
        mut submission: RecordSubmission,
        key: &DecryptionKey,
    ) -> Result<RecordReceipt> {
        submission
            .validate()
            .map_err(|errors| MedLedgerError::Validation(errors.join("; ")))?;

        if !self.ledger.is_doctor(&self.session.account).await? {
            return Err(LedgerError::Rejected(
                "Only registered doctors can add records".to_string(),
            )
            .into());
        }

        let file = Zeroizing::new(std::mem::take(&mut submission.file));
        let file_len = file.len();
        let blob = super::seal(&self.cipher, file, key).await?;
        tracing::debug!(
            "Encrypted {} byte record with key {}",
            file_len,
            key.fingerprint()
        );

        let content_id = self.store.put(blob.to_bytes()?).await?;

        let metadata = RecordMetadata {
            description: Some(submission.description),
            record_date: Some(chrono::Utc::now().to_rfc3339()),
            file_type: submission.file_type,
            ..RecordMetadata::default()
        };
        let record = NewRecord {
            patient: submission.patient,
            record_type: submission.record_type,
            content_id: content_id.clone(),
            doctor_name: submission.doctor_name,
            metadata_json: metadata.to_json()?,
        };

        let receipt = match self.ledger.add_record(&self.session.account, &record).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    "Record registration failed; blob {} is orphaned in the content store: {}",
                    content_id,
                    e
                );
                return Err(e.into());
            }
        };

        tracing::info!(
            "Registered {} record {} in tx {}",
            record.record_type,
            content_id,
            receipt.transaction_hash
        );
        Ok(RecordReceipt {
            content_id,
            receipt,
        })
    }

    /// Records for a patient, normalized, in ledger order.
    ///
    /// When the patient is the session account and the per-patient query
    /// fails, the records nested in the caller's patient details are used.
    ///
    /// # Errors
    /// Returns `Ledger` if no query succeeds.
    pub async fn list_records(&self, patient: &Address) -> Result<Vec<MedicalRecord>> {
        match self.ledger.patient_records(patient).await {
            Ok(raw) => Ok(normalize_all(raw)),
            Err(e) if patient == &self.session.account => {
                tracing::warn!("Record list query failed ({}); using patient details", e);
                let details = self.ledger.patient_details(&self.session.account).await?;
                Ok(normalize_all(details.records))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fill in a record that lacks a content id or a known type.
    ///
    /// A failed lookup is logged and the listed record is kept as is.
    pub async fn open_record(&self, record: MedicalRecord) -> MedicalRecord {
        if !record.is_incomplete() {
            return record;
        }

        let refreshed = match self.ledger.record(&record.id).await {
            Ok(raw) => raw.and_then(|raw| raw.normalize().into_iter().next()),
            Err(e) => {
                tracing::warn!("Record {} lookup failed ({}); using listed details", record.id, e);
                None
            }
        };

        match refreshed {
            Some(fresh) => merge(record, fresh),
            None => record,
        }
    }

    /// Fetch and decrypt a record's content.
    ///
    /// # Errors
    /// - `NotFound` if the record has no content id
    /// - `Store` if the blob cannot be fetched
    /// - `Crypto(DecryptionFailed)` for a wrong key or a corrupted blob
    pub async fn decrypt_record(
        &self,
        record: &MedicalRecord,
        key: &DecryptionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let content_id = record
            .content_id
            .as_ref()
            .ok_or_else(|| MedLedgerError::NotFound(format!("content for record {}", record.id)))?;

        let bytes = self.store.get(content_id).await?;
        let blob = EncryptedBlob::from_bytes(&bytes)?;
        Ok(super::open(&self.cipher, blob, key).await?)
    }

    /// Look up a record by id, complete it and decrypt it.
    ///
    /// # Errors
    /// Returns `NotFound` if the patient has no record with that id, or any
    /// error from [`Self::decrypt_record`].
    pub async fn read_record(
        &self,
        patient: &Address,
        record_id: &str,
        key: &DecryptionKey,
    ) -> Result<(MedicalRecord, Zeroizing<Vec<u8>>)> {
        let record = self
            .list_records(patient)
            .await?
            .into_iter()
            .find(|r| r.id == record_id)
            .ok_or_else(|| MedLedgerError::NotFound(format!("record {record_id}")))?;

        let record = self.open_record(record).await;
        let plaintext = self.decrypt_record(&record, key).await?;
        Ok((record, plaintext))
    }

    /// Encrypt and publish the session account's medical profile, then
    /// point the ledger at it.
    ///
    /// The profile is the JSON document the consultation gateway reads.
    ///
    /// # Errors
    /// Returns `InvalidPayload` if the profile is not a JSON object, or any
    /// cipher, store or ledger error.
    pub async fn publish_medical_profile(
        &self,
        profile: &[u8],
        key: &DecryptionKey,
    ) -> Result<RecordReceipt> {
        let parsed: serde_json::Value = serde_json::from_slice(profile)
            .map_err(|e| MedLedgerError::InvalidPayload(e.to_string()))?;
        if !parsed.is_object() {
            return Err(MedLedgerError::InvalidPayload(
                "profile must be a JSON object".to_string(),
            ));
        }

        let blob = super::seal(&self.cipher, Zeroizing::new(profile.to_vec()), key).await?;
        let content_id = self.store.put(blob.to_bytes()?).await?;

        let receipt = match self
            .ledger
            .set_patient_data(&self.session.account, &content_id)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!("Profile pointer not recorded; blob {} is orphaned: {}", content_id, e);
                return Err(e.into());
            }
        };

        tracing::info!("Published medical profile {}", content_id);
        Ok(RecordReceipt {
            content_id,
            receipt,
        })
    }

    /// Grant the doctor role. The ledger rejects non-admin callers.
    ///
    /// # Errors
    /// Returns `Ledger(Rejected)` if the session account is not the admin.
    pub async fn register_doctor(&self, doctor: &Address) -> Result<Receipt> {
        let receipt = self
            .ledger
            .register_doctor(&self.session.account, doctor)
            .await?;
        tracing::info!("Registered doctor {}", doctor);
        Ok(receipt)
    }
}

/// Prefer the refreshed fields, keeping what the listing already knew.
fn merge(listed: MedicalRecord, fresh: MedicalRecord) -> MedicalRecord {
    MedicalRecord {
        id: listed.id,
        record_type: if fresh.record_type == RecordType::Unknown {
            listed.record_type
        } else {
            fresh.record_type
        },
        content_id: fresh.content_id.or(listed.content_id),
        patient: fresh.patient.or(listed.patient),
        doctor_name: if fresh.doctor_name == UNKNOWN_DOCTOR {
            listed.doctor_name
        } else {
            fresh.doctor_name
        },
        created_at: fresh.created_at.or(listed.created_at),
        metadata: if fresh.metadata == RecordMetadata::default() {
            listed.metadata
        } else {
            fresh.metadata
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AesGcmCipher, InMemoryLedger, SqliteContentStore};
    use crate::domain::kdf::KdfParams;
    use crate::domain::{CryptoError, PatientDetails, RawLedgerRecord};
    use crate::ports::PatientDataPointer;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).expect("valid")
    }

    const ADMIN: u8 = 1;
    const DOCTOR: u8 = 2;
    const PATIENT: u8 = 9;

    fn cipher() -> Arc<AesGcmCipher> {
        Arc::new(AesGcmCipher::with_kdf_params(KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }))
    }

    struct Fixture {
        store: Arc<SqliteContentStore>,
        ledger: Arc<InMemoryLedger>,
    }

    impl Fixture {
        async fn new() -> Self {
            let ledger = Arc::new(InMemoryLedger::new(addr(ADMIN)));
            ledger
                .register_doctor(&addr(ADMIN), &addr(DOCTOR))
                .await
                .expect("Admin");
            Self {
                store: Arc::new(SqliteContentStore::in_memory().expect("Should create db")),
                ledger,
            }
        }

        fn as_account(
            &self,
            n: u8,
        ) -> RecordWorkflow<AesGcmCipher, SqliteContentStore, InMemoryLedger> {
            RecordWorkflow::new(
                SessionContext::new(addr(n)),
                cipher(),
                Arc::clone(&self.store),
                Arc::clone(&self.ledger),
            )
        }
    }

    fn lab_report(file: Vec<u8>) -> RecordSubmission {
        RecordSubmission {
            patient: addr(PATIENT),
            record_type: RecordType::LabReport,
            doctor_name: "Dr. Okafor".to_string(),
            file,
            file_type: Some("text/plain".to_string()),
            description: "Lipid panel".to_string(),
        }
    }

    fn key(s: &str) -> DecryptionKey {
        DecryptionKey::parse(s).expect("Valid key")
    }

    #[tokio::test]
    async fn test_doctor_adds_and_patient_reads_back() {
        let fx = Fixture::new().await;
        let file: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();

        let receipt = fx
            .as_account(DOCTOR)
            .add_record(lab_report(file.clone()), &key("k1"))
            .await
            .expect("Should add");
        assert!(receipt.receipt.transaction_hash.starts_with("0x"));

        let patient = fx.as_account(PATIENT);
        let records = patient.list_records(&addr(PATIENT)).await.expect("Should list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type.as_str(), "Lab Report");
        assert_eq!(records[0].doctor_name, "Dr. Okafor");
        assert_eq!(records[0].metadata.description.as_deref(), Some("Lipid panel"));
        assert!(records[0].created_at.is_some());

        let (record, plaintext) = patient
            .read_record(&addr(PATIENT), &records[0].id, &key("k1"))
            .await
            .expect("Should read");
        assert_eq!(record.content_id, Some(receipt.content_id));
        assert_eq!(plaintext.as_slice(), file.as_slice());
    }

    #[tokio::test]
    async fn test_wrong_key_fails_decryption() {
        let fx = Fixture::new().await;
        fx.as_account(DOCTOR)
            .add_record(lab_report(b"result".to_vec()), &key("k1"))
            .await
            .expect("Should add");

        let patient = fx.as_account(PATIENT);
        let err = patient
            .read_record(&addr(PATIENT), "1", &key("k2"))
            .await
            .expect_err("Wrong key");
        assert!(matches!(
            err,
            MedLedgerError::Crypto(CryptoError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_non_doctor_rejected_before_upload() {
        let fx = Fixture::new().await;
        let err = fx
            .as_account(PATIENT)
            .add_record(lab_report(b"result".to_vec()), &key("k1"))
            .await
            .expect_err("Not a doctor");

        assert!(matches!(err, MedLedgerError::Ledger(LedgerError::Rejected(_))));
        assert_eq!(fx.store.count().expect("Should count"), 0);
    }

    #[tokio::test]
    async fn test_invalid_submission() {
        let fx = Fixture::new().await;
        let mut submission = lab_report(Vec::new());
        submission.doctor_name = "  ".to_string();

        let err = fx
            .as_account(DOCTOR)
            .add_record(submission, &key("k1"))
            .await
            .expect_err("Invalid");
        match err {
            MedLedgerError::Validation(msg) => {
                assert!(msg.contains("Doctor name is required"));
                assert!(msg.contains("file"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_doctor_requires_admin() {
        let fx = Fixture::new().await;
        assert!(fx.as_account(ADMIN).register_doctor(&addr(5)).await.is_ok());
        assert!(matches!(
            fx.as_account(DOCTOR).register_doctor(&addr(6)).await,
            Err(MedLedgerError::Ledger(LedgerError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn test_publish_medical_profile_sets_pointer() {
        let fx = Fixture::new().await;
        let patient = fx.as_account(PATIENT);

        let profile = br#"{"medicalConditions":"asthma"}"#;
        let published = patient
            .publish_medical_profile(profile, &key("k1"))
            .await
            .expect("Should publish");

        let pointer = fx
            .ledger
            .patient_data(&addr(PATIENT))
            .await
            .expect("Should query");
        assert_eq!(pointer, Some(PatientDataPointer::Content(published.content_id)));

        assert!(matches!(
            patient.publish_medical_profile(b"[1,2]", &key("k1")).await,
            Err(MedLedgerError::InvalidPayload(_))
        ));
    }

    /// Ledger whose per-patient query and writes always fail, with a fixed
    /// details response and a `getRecord` answer (`None` = reverted).
    struct FlakyLedger {
        details: PatientDetails,
        full: Option<Option<RawLedgerRecord>>,
    }

    impl FlakyLedger {
        fn with_details(records: Vec<RawLedgerRecord>) -> Self {
            Self {
                details: PatientDetails { records },
                full: Some(None),
            }
        }
    }

    impl Ledger for FlakyLedger {
        async fn validate_access(
            &self,
            _: &Address,
            _: &crate::domain::AccessToken,
        ) -> std::result::Result<bool, LedgerError> {
            Ok(false)
        }
        async fn generate_access_token(
            &self,
            _: &Address,
        ) -> std::result::Result<crate::domain::AccessToken, LedgerError> {
            Err(LedgerError::Unavailable("offline".to_string()))
        }
        async fn patient_data(
            &self,
            _: &Address,
        ) -> std::result::Result<Option<PatientDataPointer>, LedgerError> {
            Ok(None)
        }
        async fn set_patient_data(
            &self,
            _: &Address,
            _: &crate::domain::ContentId,
        ) -> std::result::Result<Receipt, LedgerError> {
            Err(LedgerError::Unavailable("offline".to_string()))
        }
        async fn add_record(
            &self,
            _: &Address,
            _: &NewRecord,
        ) -> std::result::Result<Receipt, LedgerError> {
            Err(LedgerError::Unavailable("offline".to_string()))
        }
        async fn patient_records(
            &self,
            _: &Address,
        ) -> std::result::Result<Vec<RawLedgerRecord>, LedgerError> {
            Err(LedgerError::InvalidResponse("reverted".to_string()))
        }
        async fn patient_details(
            &self,
            _: &Address,
        ) -> std::result::Result<PatientDetails, LedgerError> {
            Ok(self.details.clone())
        }
        async fn record(&self, _: &str) -> std::result::Result<Option<RawLedgerRecord>, LedgerError> {
            self.full.clone().ok_or_else(|| {
                LedgerError::Rejected("execution reverted: invalid record id".to_string())
            })
        }
        async fn is_doctor(&self, _: &Address) -> std::result::Result<bool, LedgerError> {
            Ok(true)
        }
        async fn register_doctor(
            &self,
            _: &Address,
            _: &Address,
        ) -> std::result::Result<Receipt, LedgerError> {
            Err(LedgerError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_list_falls_back_to_patient_details_for_own_records() {
        let ledger = Arc::new(FlakyLedger::with_details(vec![RawLedgerRecord::BareId(
            "QmOwnRecord".to_string(),
        )]));
        let store = Arc::new(SqliteContentStore::in_memory().expect("Should create db"));

        let own = RecordWorkflow::new(
            SessionContext::new(addr(PATIENT)),
            cipher(),
            Arc::clone(&store),
            Arc::clone(&ledger),
        );
        let records = own.list_records(&addr(PATIENT)).await.expect("Should fall back");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type.as_str(), "Unknown Type");

        let other = RecordWorkflow::new(SessionContext::new(addr(DOCTOR)), cipher(), store, ledger);
        assert!(matches!(
            other.list_records(&addr(PATIENT)).await,
            Err(MedLedgerError::Ledger(_))
        ));
    }

    #[tokio::test]
    async fn test_open_record_refreshes_incomplete_entry() {
        let full = RawLedgerRecord::from_value(serde_json::json!({
            "id": "QmOwnRecord",
            "recordType": "Imaging",
            "ipfsHash": "QmOwnRecord",
            "doctorName": "Dr. Mensah",
            "timestamp": 1700000000
        }))
        .expect("Structured");
        let ledger = Arc::new(FlakyLedger {
            details: PatientDetails::default(),
            full: Some(Some(full)),
        });
        let workflow = RecordWorkflow::new(
            SessionContext::new(addr(PATIENT)),
            cipher(),
            Arc::new(SqliteContentStore::in_memory().expect("Should create db")),
            ledger,
        );

        let bare = RawLedgerRecord::BareId("QmOwnRecord".to_string())
            .normalize()
            .remove(0);
        assert!(bare.is_incomplete());

        let opened = workflow.open_record(bare).await;
        assert_eq!(opened.record_type, RecordType::Imaging);
        assert_eq!(opened.doctor_name, "Dr. Mensah");
        assert!(!opened.is_incomplete());
    }

    #[tokio::test]
    async fn test_record_without_content_is_not_found() {
        let fx = Fixture::new().await;
        let mut record = RawLedgerRecord::BareId("QmX".to_string()).normalize().remove(0);
        record.content_id = None;

        let err = fx
            .as_account(PATIENT)
            .decrypt_record(&record, &key("k1"))
            .await
            .expect_err("No content");
        assert!(matches!(err, MedLedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_listed_record_readable() {
        let store = Arc::new(SqliteContentStore::in_memory().expect("Should create db"));
        let blob = cipher()
            .encrypt(b"chest x-ray report", &key("k1"))
            .expect("Should encrypt");
        let cid = store
            .put(blob.to_bytes().expect("Should encode"))
            .await
            .expect("Should put");

        let ledger = Arc::new(FlakyLedger {
            details: PatientDetails {
                records: vec![RawLedgerRecord::BareId(cid.as_str().to_string())],
            },
            full: None,
        });
        let workflow =
            RecordWorkflow::new(SessionContext::new(addr(PATIENT)), cipher(), store, ledger);

        let (record, plaintext) = workflow
            .read_record(&addr(PATIENT), cid.as_str(), &key("k1"))
            .await
            .expect("Should read despite failed lookup");
        assert_eq!(record.record_type, RecordType::Unknown);
        assert_eq!(plaintext.as_slice(), b"chest x-ray report");
    }

    #[tokio::test]
    async fn test_refresh_keeps_known_doctor_and_metadata() {
        let ledger = Arc::new(FlakyLedger {
            details: PatientDetails::default(),
            full: Some(Some(RawLedgerRecord::from_value(serde_json::json!({
                "id": "4",
                "recordType": "Surgery",
                "ipfsHash": "QmFour"
            }))
            .expect("Structured"))),
        });
        let workflow = RecordWorkflow::new(
            SessionContext::new(addr(PATIENT)),
            cipher(),
            Arc::new(SqliteContentStore::in_memory().expect("Should create db")),
            ledger,
        );

        let mut listed = RawLedgerRecord::BareId("QmFour".to_string())
            .normalize()
            .remove(0);
        listed.doctor_name = "Dr. Lindqvist".to_string();
        listed.metadata.description = Some("Appendectomy notes".to_string());

        let opened = workflow.open_record(listed).await;
        assert_eq!(opened.record_type, RecordType::Surgery);
        assert_eq!(opened.doctor_name, "Dr. Lindqvist");
        assert_eq!(opened.metadata.description.as_deref(), Some("Appendectomy notes"));
    }

    #[tokio::test]
    async fn test_failed_registration_leaves_orphaned_blob() {
        let store = Arc::new(SqliteContentStore::in_memory().expect("Should create db"));
        let workflow = RecordWorkflow::new(
            SessionContext::new(addr(DOCTOR)),
            cipher(),
            Arc::clone(&store),
            Arc::new(FlakyLedger::with_details(Vec::new())),
        );

        let err = workflow
            .add_record(lab_report(b"potassium 4.1".to_vec()), &key("k1"))
            .await
            .expect_err("Registration fails");
        assert!(matches!(err, MedLedgerError::Ledger(LedgerError::Unavailable(_))));
        assert_eq!(store.count().expect("Should count"), 1);
    }
}
