//! JSON-RPC adapter: Implementation of Ledger against a contract relay.
//!
//! Each ledger call is one JSON-RPC 2.0 request whose method is the contract
//! method name and whose params carry the contract address, the sending
//! account (for state-changing calls) and the positional arguments:
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"addRecord",
//!  "params":{"contract":"0x..","from":"0x..","args":["0x..","Lab Report","Qm..","Dr. A","{}"]}}
//! ```
//!
//! A JSON-RPC error object means the contract refused the call (revert,
//! missing role). Transport failures are reported as unavailable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::ledger_record::parse_record_list;
use crate::domain::{
    AccessToken, Address, ContentId, EncryptedBlob, NewRecord, PatientDetails, RawLedgerRecord,
    Receipt,
};
use crate::ports::{Ledger, LedgerError, PatientDataPointer};

/// JSON-RPC ledger client.
#[derive(Debug)]
pub struct JsonRpcLedger {
    client: reqwest::Client,
    url: String,
    contract: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl JsonRpcLedger {
    /// Create a client for the relay at `url`, targeting `contract`.
    ///
    /// # Errors
    /// Returns `LedgerError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        contract: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            contract: contract.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(
        &self,
        method: &str,
        from: Option<&Address>,
        args: Vec<Value>,
    ) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut params = json!({ "contract": self.contract, "args": args });
        if let Some(from) = from {
            params["from"] = json!(from.as_str());
        }
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        tracing::debug!("Ledger call {} (id {})", method, id);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(error) = body.error {
            tracing::warn!("Ledger rejected {}: code {}", method, error.code);
            return Err(LedgerError::Rejected(error.message));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    fn receipt(method: &str, value: Value) -> Result<Receipt, LedgerError> {
        match value {
            Value::String(hash) => Ok(Receipt {
                transaction_hash: hash,
                block_number: None,
            }),
            other => serde_json::from_value(other)
                .map_err(|e| LedgerError::InvalidResponse(format!("{method} receipt: {e}"))),
        }
    }
}

/// Extract the token from an `AccessGranted` event, or from a bare result.
fn access_token_from(value: &Value) -> Option<String> {
    value
        .pointer("/events/AccessGranted/returnValues/token")
        .or_else(|| value.get("token"))
        .or(Some(value))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn patient_data_from(value: Value) -> Result<Option<PatientDataPointer>, LedgerError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => ContentId::new(s)
            .map(|id| Some(PatientDataPointer::Content(id)))
            .map_err(LedgerError::InvalidResponse),
        obj @ Value::Object(_) => EncryptedBlob::from_value(obj)
            .map(|blob| Some(PatientDataPointer::Inline(blob)))
            .map_err(|_| LedgerError::InvalidResponse("getPatientData: unknown shape".to_string())),
        _ => Err(LedgerError::InvalidResponse(
            "getPatientData: unknown shape".to_string(),
        )),
    }
}

impl Ledger for JsonRpcLedger {
    async fn validate_access(
        &self,
        subject: &Address,
        token: &AccessToken,
    ) -> Result<bool, LedgerError> {
        let result = self
            .call(
                "validateAccess",
                None,
                vec![json!(subject.as_str()), json!(token.as_str())],
            )
            .await;

        match result {
            Ok(Value::Bool(granted)) => Ok(granted),
            Ok(Value::Null) => Ok(false),
            Ok(other) => Err(LedgerError::InvalidResponse(format!(
                "validateAccess returned {other}"
            ))),
            // A revert on validation means "not authorized", not a failure.
            Err(LedgerError::Rejected(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn generate_access_token(&self, from: &Address) -> Result<AccessToken, LedgerError> {
        let result = self.call("generateAccessToken", Some(from), Vec::new()).await?;
        let token = access_token_from(&result).ok_or_else(|| {
            LedgerError::InvalidResponse("generateAccessToken: no AccessGranted token".to_string())
        })?;
        AccessToken::new(token).map_err(LedgerError::InvalidResponse)
    }

    async fn patient_data(
        &self,
        patient: &Address,
    ) -> Result<Option<PatientDataPointer>, LedgerError> {
        let result = self
            .call("getPatientData", None, vec![json!(patient.as_str())])
            .await?;
        patient_data_from(result)
    }

    async fn set_patient_data(
        &self,
        from: &Address,
        content_id: &ContentId,
    ) -> Result<Receipt, LedgerError> {
        let result = self
            .call("setPatientData", Some(from), vec![json!(content_id.as_str())])
            .await?;
        Self::receipt("setPatientData", result)
    }

    async fn add_record(&self, from: &Address, record: &NewRecord) -> Result<Receipt, LedgerError> {
        let args = vec![
            json!(record.patient.as_str()),
            json!(record.record_type.as_str()),
            json!(record.content_id.as_str()),
            json!(record.doctor_name),
            json!(record.metadata_json),
        ];
        let result = self.call("addRecord", Some(from), args).await?;
        Self::receipt("addRecord", result)
    }

    async fn patient_records(&self, patient: &Address) -> Result<Vec<RawLedgerRecord>, LedgerError> {
        let result = self
            .call("getPatientRecords", None, vec![json!(patient.as_str())])
            .await?;
        match result {
            Value::Array(values) => Ok(parse_record_list(values)),
            Value::Null => Ok(Vec::new()),
            other => Err(LedgerError::InvalidResponse(format!(
                "getPatientRecords returned {}",
                json_kind(&other)
            ))),
        }
    }

    async fn patient_details(&self, from: &Address) -> Result<PatientDetails, LedgerError> {
        let result = self.call("getPatientDetails", Some(from), Vec::new()).await?;
        let records = match result {
            Value::Object(mut map) => match map.remove("records") {
                Some(Value::Array(values)) => parse_record_list(values),
                _ => Vec::new(),
            },
            other => {
                return Err(LedgerError::InvalidResponse(format!(
                    "getPatientDetails returned {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(PatientDetails { records })
    }

    async fn record(&self, id: &str) -> Result<Option<RawLedgerRecord>, LedgerError> {
        let result = self.call("getRecord", None, vec![json!(id)]).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(parse_record_list(vec![result]).into_iter().next())
    }

    async fn is_doctor(&self, address: &Address) -> Result<bool, LedgerError> {
        let result = self
            .call("isDoctor", None, vec![json!(address.as_str())])
            .await?;
        result
            .as_bool()
            .ok_or_else(|| LedgerError::InvalidResponse("isDoctor returned non-bool".to_string()))
    }

    async fn register_doctor(&self, from: &Address, doctor: &Address) -> Result<Receipt, LedgerError> {
        let result = self
            .call("registerDoctor", Some(from), vec![json!(doctor.as_str())])
            .await?;
        Self::receipt("registerDoctor", result)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
