//! Medical record types.
//!
//! Records are created by doctors, registered on the ledger, and never
//! modified or deleted afterwards.

use serde::{Deserialize, Serialize};

/// Placeholder shown when the ledger gave no doctor name.
pub const UNKNOWN_DOCTOR: &str = "Unknown Doctor";

/// Placeholder shown when the ledger gave no timestamp.
pub const UNKNOWN_DATE: &str = "Unknown Date";

/// Ledger account address (`0x` + 40 hex digits), stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address.
    ///
    /// # Errors
    /// Returns a description of the problem if the address is malformed.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let Some(hex_part) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) else {
            return Err(format!("Address {input:?} must start with 0x"));
        };
        if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("Address {input:?} must have 40 hex digits"));
        }
        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a blob in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a store-issued identifier.
    ///
    /// # Errors
    /// Returns an error if the identifier is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err("Content identifier is empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of medical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordType {
    Prescription,
    LabReport,
    Diagnosis,
    Imaging,
    Surgery,
    /// A type name the ledger knows but this client does not.
    Other(String),
    /// The ledger gave no type at all.
    Unknown,
}

impl RecordType {
    /// Types a doctor can choose when adding a record.
    pub const SELECTABLE: [RecordType; 5] = [
        RecordType::Prescription,
        RecordType::LabReport,
        RecordType::Diagnosis,
        RecordType::Imaging,
        RecordType::Surgery,
    ];

    /// Interpret a ledger type name. Never fails.
    #[must_use]
    pub fn from_ledger(name: &str) -> Self {
        match name.trim() {
            "" => Self::Unknown,
            "Prescription" => Self::Prescription,
            "Lab Report" => Self::LabReport,
            "Diagnosis" => Self::Diagnosis,
            "Imaging" => Self::Imaging,
            "Surgery" => Self::Surgery,
            "Unknown Type" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    /// Name as written to the ledger.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prescription => "Prescription",
            Self::LabReport => "Lab Report",
            Self::Diagnosis => "Diagnosis",
            Self::Imaging => "Imaging",
            Self::Surgery => "Surgery",
            Self::Other(name) => name,
            Self::Unknown => "Unknown Type",
        }
    }

    /// Whether this is one of the selectable types.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_) | Self::Unknown)
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    /// Strict parse for user input: only the selectable types are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = Self::from_ledger(s);
        if parsed.is_known() {
            Ok(parsed)
        } else {
            Err(format!(
                "Unknown record type {s:?}; expected one of: {}",
                Self::SELECTABLE
                    .iter()
                    .map(RecordType::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form metadata stored on the ledger as a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// RFC 3339 time the record was prepared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_date: Option<String>,

    /// MIME type of the original file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    /// Keys this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RecordMetadata {
    /// Encode for the ledger.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the ledger, keeping unparseable text as the description.
    #[must_use]
    pub fn from_ledger_str(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|_| Self {
            description: Some(raw.to_string()),
            ..Self::default()
        })
    }
}

/// A record as presented to callers, after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalRecord {
    /// Ledger identifier (never empty)
    pub id: String,

    pub record_type: RecordType,

    /// Pointer into the content store; `None` if the ledger did not give one
    pub content_id: Option<ContentId>,

    /// Owning patient, when the ledger reports it
    pub patient: Option<Address>,

    pub doctor_name: String,

    /// Registration time; `None` renders as "Unknown Date"
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    pub metadata: RecordMetadata,
}

impl MedicalRecord {
    /// Whether the record lacks details that `getRecord` could fill in.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.content_id.is_none() || self.record_type == RecordType::Unknown
    }

    /// Creation time for display.
    #[must_use]
    pub fn display_date(&self) -> String {
        self.created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string())
    }
}

/// Input to the write path.
#[derive(Debug, Clone)]
pub struct RecordSubmission {
    pub patient: Address,
    pub record_type: RecordType,
    pub doctor_name: String,
    /// Plaintext file contents
    pub file: Vec<u8>,
    /// MIME type of the file, if known
    pub file_type: Option<String>,
    pub description: String,
}

impl RecordSubmission {
    /// Validate user-entered fields.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.record_type.is_known() {
            errors.push(format!("Record type {} is not selectable", self.record_type));
        }
        if self.doctor_name.trim().is_empty() {
            errors.push("Doctor name is required".to_string());
        }
        if self.file.is_empty() {
            errors.push("Please select a medical record file to upload".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A record as sent to the ledger's `addRecord`.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub patient: Address,
    pub record_type: RecordType,
    pub content_id: ContentId,
    pub doctor_name: String,
    /// JSON-encoded [`RecordMetadata`]
    pub metadata_json: String,
}

/// Ledger transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Result of a successful write path.
#[derive(Debug, Clone)]
pub struct RecordReceipt {
    pub content_id: ContentId,
    pub receipt: Receipt,
}
