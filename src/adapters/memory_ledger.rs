//! In-memory adapter: a local ledger with the contract's rules.
//!
//! - one admin, fixed at construction, may register doctors
//! - only doctors may add records; records are append-only
//! - access tokens are single-use and expire after a TTL
//!
//! Used for local runs and tests where no chain is available.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::{
    AccessToken, Address, ContentId, NewRecord, PatientDetails, RawLedgerRecord, Receipt,
    StructuredRecord,
};
use crate::ports::{Ledger, LedgerError, PatientDataPointer};

/// Default lifetime of an access token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

struct StoredRecord {
    id: u64,
    record: NewRecord,
    created_at: i64,
}

struct IssuedToken {
    subject: Address,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct State {
    doctors: HashSet<Address>,
    records: Vec<StoredRecord>,
    patient_data: HashMap<Address, ContentId>,
    tokens: HashMap<String, IssuedToken>,
    block: u64,
}

/// In-memory ledger.
pub struct InMemoryLedger {
    admin: Address,
    token_ttl: Duration,
    state: Mutex<State>,
}

impl InMemoryLedger {
    /// Create a ledger administered by `admin`.
    #[must_use]
    pub fn new(admin: Address) -> Self {
        Self::with_token_ttl(admin, DEFAULT_TOKEN_TTL)
    }

    /// Create a ledger with a specific access-token lifetime.
    #[must_use]
    pub fn with_token_ttl(admin: Address, token_ttl: Duration) -> Self {
        Self {
            admin,
            token_ttl,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger state lock poisoned".to_string()))
    }

    fn random_hex(len: usize) -> String {
        let mut rng = ChaCha20Rng::from_entropy();
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        hex::encode(bytes)
    }

    fn mine(state: &mut State) -> Receipt {
        state.block += 1;
        Receipt {
            transaction_hash: format!("0x{}", Self::random_hex(32)),
            block_number: Some(state.block),
        }
    }

    fn to_raw(stored: &StoredRecord) -> RawLedgerRecord {
        RawLedgerRecord::Structured(StructuredRecord {
            id: Some(stored.id.to_string()),
            record_type: Some(stored.record.record_type.as_str().to_string()),
            content_hash: Some(stored.record.content_id.as_str().to_string()),
            patient: Some(stored.record.patient.as_str().to_string()),
            doctor_name: Some(stored.record.doctor_name.clone()),
            timestamp: Some(serde_json::json!(stored.created_at)),
            metadata: Some(serde_json::Value::String(stored.record.metadata_json.clone())),
        })
    }
}

impl Ledger for InMemoryLedger {
    async fn validate_access(
        &self,
        subject: &Address,
        token: &AccessToken,
    ) -> Result<bool, LedgerError> {
        let mut state = self.lock()?;
        let Some(issued) = state.tokens.remove(token.as_str()) else {
            return Ok(false);
        };
        Ok(&issued.subject == subject && issued.expires_at > chrono::Utc::now())
    }

    async fn generate_access_token(&self, from: &Address) -> Result<AccessToken, LedgerError> {
        let ttl = chrono::Duration::from_std(self.token_ttl)
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        let token = format!("0x{}", Self::random_hex(32));

        let mut state = self.lock()?;
        let now = chrono::Utc::now();
        state.tokens.retain(|_, t| t.expires_at > now);
        state.tokens.insert(
            token.clone(),
            IssuedToken {
                subject: from.clone(),
                expires_at: now + ttl,
            },
        );
        AccessToken::new(token).map_err(LedgerError::InvalidResponse)
    }

    async fn patient_data(
        &self,
        patient: &Address,
    ) -> Result<Option<PatientDataPointer>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .patient_data
            .get(patient)
            .cloned()
            .map(PatientDataPointer::Content))
    }

    async fn set_patient_data(
        &self,
        from: &Address,
        content_id: &ContentId,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.lock()?;
        state.patient_data.insert(from.clone(), content_id.clone());
        Ok(Self::mine(&mut state))
    }

    async fn add_record(&self, from: &Address, record: &NewRecord) -> Result<Receipt, LedgerError> {
        let mut state = self.lock()?;
        if !state.doctors.contains(from) {
            return Err(LedgerError::Rejected(
                "Only registered doctors can add records".to_string(),
            ));
        }

        let id = state.records.len() as u64 + 1;
        state.records.push(StoredRecord {
            id,
            record: record.clone(),
            created_at: chrono::Utc::now().timestamp(),
        });
        Ok(Self::mine(&mut state))
    }

    async fn patient_records(&self, patient: &Address) -> Result<Vec<RawLedgerRecord>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|r| &r.record.patient == patient)
            .map(Self::to_raw)
            .collect())
    }

    async fn patient_details(&self, from: &Address) -> Result<PatientDetails, LedgerError> {
        let records = self.patient_records(from).await?;
        Ok(PatientDetails { records })
    }

    async fn record(&self, id: &str) -> Result<Option<RawLedgerRecord>, LedgerError> {
        let Ok(id) = id.parse::<u64>() else {
            return Ok(None);
        };
        let state = self.lock()?;
        Ok(state.records.iter().find(|r| r.id == id).map(Self::to_raw))
    }

    async fn is_doctor(&self, address: &Address) -> Result<bool, LedgerError> {
        Ok(self.lock()?.doctors.contains(address))
    }

    async fn register_doctor(&self, from: &Address, doctor: &Address) -> Result<Receipt, LedgerError> {
        if from != &self.admin {
            return Err(LedgerError::Rejected(
                "Only the admin can register doctors".to_string(),
            ));
        }
        let mut state = self.lock()?;
        state.doctors.insert(doctor.clone());
        Ok(Self::mine(&mut state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordType;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).expect("valid")
    }

    fn new_record(patient: &Address) -> NewRecord {
        NewRecord {
            patient: patient.clone(),
            record_type: RecordType::Imaging,
            content_id: ContentId::new("QmScan").expect("valid"),
            doctor_name: "Dr. Mensah".to_string(),
            metadata_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_admin_registers_doctors() {
        let ledger = InMemoryLedger::new(addr(1));
        assert!(matches!(
            ledger.register_doctor(&addr(2), &addr(3)).await,
            Err(LedgerError::Rejected(_))
        ));

        let receipt = ledger.register_doctor(&addr(1), &addr(3)).await.expect("Admin");
        assert_eq!(receipt.block_number, Some(1));
        assert!(ledger.is_doctor(&addr(3)).await.expect("Should query"));
    }

    #[tokio::test]
    async fn test_only_doctors_add_records_in_order() {
        let ledger = InMemoryLedger::new(addr(1));
        ledger.register_doctor(&addr(1), &addr(3)).await.expect("Admin");
        let patient = addr(9);

        assert!(matches!(
            ledger.add_record(&addr(4), &new_record(&patient)).await,
            Err(LedgerError::Rejected(_))
        ));

        ledger.add_record(&addr(3), &new_record(&patient)).await.expect("Doctor");
        ledger.add_record(&addr(3), &new_record(&patient)).await.expect("Doctor");
        ledger.add_record(&addr(3), &new_record(&addr(8))).await.expect("Doctor");

        let records = ledger.patient_records(&patient).await.expect("Should list");
        let ids: Vec<_> = records
            .into_iter()
            .flat_map(RawLedgerRecord::normalize)
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        assert!(ledger.record("3").await.expect("Should query").is_some());
        assert!(ledger.record("nope").await.expect("Should query").is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_single_use_and_bound_to_subject() {
        let ledger = InMemoryLedger::new(addr(1));
        let patient = addr(9);

        let token = ledger.generate_access_token(&patient).await.expect("Should issue");
        assert!(ledger.validate_access(&patient, &token).await.expect("Should check"));
        assert!(!ledger.validate_access(&patient, &token).await.expect("Should check"));

        let other = ledger.generate_access_token(&addr(8)).await.expect("Should issue");
        assert!(!ledger.validate_access(&patient, &other).await.expect("Should check"));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let ledger = InMemoryLedger::with_token_ttl(addr(1), Duration::ZERO);
        let token = ledger.generate_access_token(&addr(9)).await.expect("Should issue");
        assert!(!ledger.validate_access(&addr(9), &token).await.expect("Should check"));
    }
}
