//! Consultation gateway: answers a patient's health question from their
//! decrypted medical profile without letting identifiers reach the model.
//!
//! Per request:
//! 1. Validate the access token with the ledger
//! 2. Resolve the patient's profile pointer and fetch the blob
//! 3. Decrypt with the caller-supplied key
//! 4. Derive the redacted clinical context and compose the prompt
//! 5. Return the model's completion verbatim
//!
//! Nothing is kept between requests.

use std::sync::Arc;

use rand::RngCore;

use crate::domain::redaction::redact;
use crate::domain::{
    AccessToken, Address, DecryptionKey, EncryptedBlob, MedicalPayload, SanitizedMedicalContext,
};
use crate::ports::{ContentStore, LanguageModel, Ledger, PatientDataPointer, SymmetricCipher};
use crate::{MedLedgerError, Result};

/// Service for AI health consultations.
pub struct ConsultationGateway<C, S, L, M>
where
    C: SymmetricCipher,
    S: ContentStore,
    L: Ledger,
    M: LanguageModel,
{
    cipher: Arc<C>,
    store: Arc<S>,
    ledger: Arc<L>,
    model: Arc<M>,
}

impl<C, S, L, M> ConsultationGateway<C, S, L, M>
where
    C: SymmetricCipher + 'static,
    S: ContentStore,
    L: Ledger,
    M: LanguageModel,
{
    /// Create a new consultation gateway.
    pub fn new(cipher: Arc<C>, store: Arc<S>, ledger: Arc<L>, model: Arc<M>) -> Self {
        Self {
            cipher,
            store,
            ledger,
            model,
        }
    }

    /// Obtain an access token for `patient` from the ledger, then consult.
    ///
    /// # Errors
    /// Returns `Ledger` if no token can be issued, or any error from
    /// [`Self::consult_with_token`].
    pub async fn consult(
        &self,
        patient: &Address,
        key: &DecryptionKey,
        question: &str,
    ) -> Result<String> {
        let token = self.ledger.generate_access_token(patient).await?;
        self.consult_with_token(patient, &token, key, question).await
    }

    /// Answer `question` for `patient` under an existing access token.
    ///
    /// # Errors
    /// - `Validation` if the question is blank
    /// - `Unauthorized` if the ledger does not grant access
    /// - `NotFound` if the patient has published no medical profile
    /// - `Crypto(DecryptionFailed)` for a wrong key
    /// - `InvalidPayload` if the decrypted profile is not a JSON object
    /// - `Store`, `Ledger` or `Model` if a collaborator fails
    pub async fn consult_with_token(
        &self,
        patient: &Address,
        token: &AccessToken,
        key: &DecryptionKey,
        question: &str,
    ) -> Result<String> {
        if question.trim().is_empty() {
            return Err(MedLedgerError::Validation("Query is required".to_string()));
        }

        let request_id = new_request_id();
        tracing::info!(
            "AI consultation request {} for patient key {}",
            request_id,
            key.fingerprint()
        );

        if !self.ledger.validate_access(patient, token).await? {
            tracing::warn!("AI consultation request {} denied by ledger", request_id);
            return Err(MedLedgerError::Unauthorized);
        }

        let blob = match self.ledger.patient_data(patient).await? {
            None => {
                return Err(MedLedgerError::NotFound(
                    "medical profile for patient".to_string(),
                ))
            }
            Some(PatientDataPointer::Inline(blob)) => blob,
            Some(PatientDataPointer::Content(id)) => {
                let bytes = self.store.get(&id).await?;
                EncryptedBlob::from_bytes(&bytes)?
            }
        };

        let plaintext = super::open(&self.cipher, blob, key).await?;
        let payload = MedicalPayload::from_slice(&plaintext)
            .map_err(|e| MedLedgerError::InvalidPayload(e.to_string()))?;
        drop(plaintext);

        let context = SanitizedMedicalContext::derive(&payload).map_text(redact);
        let answer = self.model.complete(&context.prompt(question)).await?;

        tracing::info!("AI consultation request {} answered", request_id);
        Ok(answer)
    }
}

fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
