//! Consultation types: access tokens, decrypted medical payloads, and the
//! redacted context that is allowed to leave the trust boundary.

use serde::Deserialize;
use serde_json::Value;

/// Text used for clinical fields absent from the payload.
pub const NOT_PROVIDED: &str = "not provided";

/// Replacement for identifier values found inside clinical text.
pub const REDACTED: &str = "[REDACTED]";

/// Short-lived capability issued by the ledger for one consultation.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a ledger-issued token.
    ///
    /// # Errors
    /// Returns an error if the token is blank.
    pub fn new(token: impl Into<String>) -> Result<Self, String> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err("Access token is empty".to_string());
        }
        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Decrypted patient medical profile.
///
/// Identifier fields are read only so their values can be scrubbed from the
/// clinical text; they never reach the prompt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalPayload {
    #[serde(default)]
    pub patient_name: Option<Value>,
    #[serde(default, rename = "patientID", alias = "patientId")]
    pub patient_id: Option<Value>,
    #[serde(default)]
    pub full_address: Option<Value>,
    #[serde(default)]
    pub insurance_number: Option<Value>,

    #[serde(default)]
    pub medical_conditions: Option<Value>,
    #[serde(default)]
    pub medications: Option<Value>,
    #[serde(default)]
    pub allergies: Option<Value>,
    #[serde(default)]
    pub vital_signs: Option<Value>,
    #[serde(default)]
    pub lab_results: Option<Value>,
}

impl MedicalPayload {
    /// Parse a decrypted payload.
    ///
    /// # Errors
    /// Returns error if the plaintext is not a JSON object of this shape.
    pub fn from_slice(plaintext: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(plaintext)
    }

    /// Text values of the direct identifier fields.
    fn identifier_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        for field in [
            &self.patient_name,
            &self.patient_id,
            &self.full_address,
            &self.insurance_number,
        ]
        .into_iter()
        .flatten()
        {
            collect_strings(field, &mut values);
        }
        // Very short fragments would shred ordinary clinical words.
        values.retain(|v| v.trim().chars().count() >= 3);
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));
        values
    }
}

/// Clinical fields only, rendered as text. Derived fresh per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedMedicalContext {
    pub medical_conditions: String,
    pub medications: String,
    pub allergies: String,
    pub vital_signs: String,
    pub lab_results: String,
}

impl SanitizedMedicalContext {
    /// Keep the clinical fields and scrub any identifier values from them.
    #[must_use]
    pub fn derive(payload: &MedicalPayload) -> Self {
        let identifiers = payload.identifier_values();
        let render = |field: &Option<Value>| scrub(&render_field(field.as_ref()), &identifiers);

        Self {
            medical_conditions: render(&payload.medical_conditions),
            medications: render(&payload.medications),
            allergies: render(&payload.allergies),
            vital_signs: render(&payload.vital_signs),
            lab_results: render(&payload.lab_results),
        }
    }

    /// Apply an additional text filter to every field.
    #[must_use]
    pub fn map_text(self, filter: impl Fn(&str) -> String) -> Self {
        Self {
            medical_conditions: filter(&self.medical_conditions),
            medications: filter(&self.medications),
            allergies: filter(&self.allergies),
            vital_signs: filter(&self.vital_signs),
            lab_results: filter(&self.lab_results),
        }
    }

    /// Compose the fixed prompt sent to the language model.
    #[must_use]
    pub fn prompt(&self, question: &str) -> String {
        format!(
            "You are a healthcare assistant providing general information only.\n\
             Never reference any specific patient details in your response.\n\
             Based on the following anonymized medical context and query, provide helpful information:\n\
             \n\
             Medical context (anonymized):\n\
             - Medical conditions: {}\n\
             - Current medications: {}\n\
             - Allergies: {}\n\
             - Recent vital signs: {}\n\
             - Relevant lab results: {}\n\
             \n\
             User query: {}\n",
            self.medical_conditions,
            self.medications,
            self.allergies,
            self.vital_signs,
            self.lab_results,
            question.trim(),
        )
    }
}

fn render_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_PROVIDED.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => NOT_PROVIDED.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.is_empty() => NOT_PROVIDED.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Null | Value::Bool(_) => {}
    }
}

fn scrub(text: &str, identifiers: &[String]) -> String {
    identifiers
        .iter()
        .fold(text.to_string(), |acc, id| acc.replace(id.as_str(), REDACTED))
}
