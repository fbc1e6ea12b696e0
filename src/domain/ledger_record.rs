//! Raw record shapes returned by the ledger, and their normalization.
//!
//! The ledger has returned records in three encodings over time: full
//! structs, bare identifier strings, and a patient-details struct with the
//! records nested inside. Each shape has its own normalization function;
//! anything else is rejected as [`MalformedRecordShape`].

use serde_json::{Map, Value};

use super::record::{
    Address, ContentId, MedicalRecord, RecordMetadata, RecordType, UNKNOWN_DOCTOR,
};

/// Identifier used when the ledger gave neither an id nor a content id.
pub const UNKNOWN_ID: &str = "unknown";

/// The ledger returned a value that is none of the known record shapes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Unrecognized ledger record shape: {kind}")]
pub struct MalformedRecordShape {
    pub kind: &'static str,
}

/// A record entry exactly as the ledger encoded it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLedgerRecord {
    Structured(StructuredRecord),
    BareId(String),
    Nested(PatientDetails),
}

/// Full record struct. Every field is optional; the ledger has used several
/// names for some of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredRecord {
    pub id: Option<String>,
    pub record_type: Option<String>,
    pub content_hash: Option<String>,
    pub patient: Option<String>,
    pub doctor_name: Option<String>,
    /// Unix seconds, as a number or a numeric string
    pub timestamp: Option<Value>,
    /// JSON-encoded string or an inline object
    pub metadata: Option<Value>,
}

impl StructuredRecord {
    /// Read each field on its own, taking the first non-empty alias.
    /// A field of an unexpected type is treated as absent.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            id: first_text(map, &["id", "recordId"]),
            record_type: first_text(map, &["recordType"]),
            content_hash: first_text(map, &["ipfsHash", "dataHash", "contentId", "contentHash"]),
            patient: first_text(map, &["patient", "patientAddress"]),
            doctor_name: first_text(map, &["doctorName"]),
            timestamp: map.get("timestamp").filter(|v| !v.is_null()).cloned(),
            metadata: map.get("metadata").filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Patient-details struct whose `records` field holds nested entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientDetails {
    pub records: Vec<RawLedgerRecord>,
}

impl RawLedgerRecord {
    /// Classify a JSON value from the ledger.
    ///
    /// An object carrying a `records` array is the nested shape; any other
    /// object is a structured record. Strings and numbers are bare ids.
    ///
    /// Malformed entries inside a nested list are skipped individually.
    ///
    /// # Errors
    /// Returns `MalformedRecordShape` for null, booleans and arrays.
    pub fn from_value(value: Value) -> Result<Self, MalformedRecordShape> {
        match value {
            Value::String(id) => Ok(Self::BareId(id)),
            Value::Number(n) => Ok(Self::BareId(n.to_string())),
            Value::Object(mut map) if map.get("records").is_some_and(Value::is_array) => {
                let Some(Value::Array(entries)) = map.remove("records") else {
                    return Err(MalformedRecordShape { kind: "records" });
                };
                Ok(Self::Nested(PatientDetails {
                    records: parse_record_list(entries),
                }))
            }
            Value::Object(map) => Ok(Self::Structured(StructuredRecord::from_map(&map))),
            Value::Null => Err(MalformedRecordShape { kind: "null" }),
            Value::Bool(_) => Err(MalformedRecordShape { kind: "bool" }),
            Value::Array(_) => Err(MalformedRecordShape { kind: "array" }),
        }
    }

    /// Normalize into canonical records. Nested entries are flattened.
    #[must_use]
    pub fn normalize(self) -> Vec<MedicalRecord> {
        match self {
            Self::Structured(record) => vec![normalize_structured(record)],
            Self::BareId(id) => normalize_bare(id).into_iter().collect(),
            Self::Nested(details) => normalize_nested(details),
        }
    }
}

/// Parse a list of ledger values, skipping malformed entries.
#[must_use]
pub fn parse_record_list(values: Vec<Value>) -> Vec<RawLedgerRecord> {
    values
        .into_iter()
        .filter_map(|value| match RawLedgerRecord::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping ledger record: {e}");
                None
            }
        })
        .collect()
}

/// Normalize a sequence of raw records, preserving ledger order.
#[must_use]
pub fn normalize_all(records: Vec<RawLedgerRecord>) -> Vec<MedicalRecord> {
    records
        .into_iter()
        .flat_map(RawLedgerRecord::normalize)
        .collect()
}

fn normalize_structured(record: StructuredRecord) -> MedicalRecord {
    let content_id = record
        .content_hash
        .and_then(|hash| ContentId::new(hash).ok());

    let id = record
        .id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| content_id.as_ref().map(|c| c.as_str().to_string()))
        .unwrap_or_else(|| UNKNOWN_ID.to_string());

    let record_type = record
        .record_type
        .as_deref()
        .map(RecordType::from_ledger)
        .unwrap_or(RecordType::Unknown);

    let doctor_name = record
        .doctor_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string());

    let metadata = match record.metadata {
        Some(Value::String(raw)) => RecordMetadata::from_ledger_str(&raw),
        Some(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
        _ => RecordMetadata::default(),
    };

    MedicalRecord {
        id,
        record_type,
        content_id,
        patient: record.patient.and_then(|p| Address::parse(&p).ok()),
        doctor_name,
        created_at: record.timestamp.as_ref().and_then(parse_timestamp),
        metadata,
    }
}

fn normalize_bare(id: String) -> Option<MedicalRecord> {
    let content_id = ContentId::new(id.clone()).ok()?;
    Some(MedicalRecord {
        id: content_id.as_str().to_string(),
        record_type: RecordType::Unknown,
        content_id: Some(content_id),
        patient: None,
        doctor_name: UNKNOWN_DOCTOR.to_string(),
        created_at: None,
        metadata: RecordMetadata::default(),
    })
}

fn normalize_nested(details: PatientDetails) -> Vec<MedicalRecord> {
    normalize_all(details.records)
}

/// Ledger timestamps are Unix seconds; zero means "not set".
fn parse_timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if secs <= 0 {
        return None;
    }
    chrono::DateTime::from_timestamp(secs, 0)
}

/// First alias holding a non-blank string or a number.
fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
