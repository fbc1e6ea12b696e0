//! HTTP surface: `POST /api/ai/health-assistant`.
//!
//! Request body (camelCase JSON):
//! `{ "patientAddress", "patientKey", "query", "accessToken" }`
//!
//! Responses:
//! - `200 {"response": "..."}`
//! - `403 {"error": "Unauthorized access"}` when the ledger denies access
//! - `500 {"error": "..."}` for every other failure, with a short
//!   category message that never carries record content or key material

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::application::ConsultationGateway;
use crate::domain::{AccessToken, Address, DecryptionKey};
use crate::ports::{ContentStore, LanguageModel, Ledger, SymmetricCipher};
use crate::MedLedgerError;

/// Path of the consultation endpoint.
pub const HEALTH_ASSISTANT_PATH: &str = "/api/ai/health-assistant";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAssistantRequest {
    pub patient_address: String,
    pub patient_key: Zeroizing<String>,
    pub query: String,
    pub access_token: String,
}

impl std::fmt::Debug for HealthAssistantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAssistantRequest")
            .field("patient_address", &self.patient_address)
            .field("patient_key", &"[REDACTED]")
            .field("query_len", &self.query.len())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthAssistantResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error as returned to HTTP clients.
#[derive(Debug)]
pub struct ApiError(MedLedgerError);

impl From<MedLedgerError> for ApiError {
    fn from(e: MedLedgerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            MedLedgerError::Unauthorized => (StatusCode::FORBIDDEN, "Unauthorized access"),
            MedLedgerError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Decryption failed"),
            MedLedgerError::NotFound(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Medical data not found")
            }
            MedLedgerError::InvalidPayload(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Medical data could not be read",
            ),
            MedLedgerError::Validation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Invalid request"),
            MedLedgerError::Ledger(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Ledger unavailable"),
            MedLedgerError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable"),
            MedLedgerError::Model(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AI service unavailable")
            }
            MedLedgerError::Io(_) | MedLedgerError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status == StatusCode::FORBIDDEN {
            tracing::warn!("AI consultation denied");
        } else {
            tracing::error!("AI consultation error: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the router around a consultation gateway.
pub fn router<C, S, L, M>(gateway: Arc<ConsultationGateway<C, S, L, M>>) -> Router
where
    C: SymmetricCipher + 'static,
    S: ContentStore + 'static,
    L: Ledger + 'static,
    M: LanguageModel + 'static,
{
    Router::new()
        .route(HEALTH_ASSISTANT_PATH, post(health_assistant::<C, S, L, M>))
        .with_state(gateway)
}

async fn health_assistant<C, S, L, M>(
    State(gateway): State<Arc<ConsultationGateway<C, S, L, M>>>,
    body: Result<Json<HealthAssistantRequest>, JsonRejection>,
) -> Result<Json<HealthAssistantResponse>, ApiError>
where
    C: SymmetricCipher + 'static,
    S: ContentStore + 'static,
    L: Ledger + 'static,
    M: LanguageModel + 'static,
{
    // Rejection text may echo request values; keep only the status.
    let Json(request) = body.map_err(|rejection| {
        MedLedgerError::Validation(format!("malformed request body ({})", rejection.status()))
    })?;

    let patient = Address::parse(&request.patient_address).map_err(MedLedgerError::Validation)?;
    let token = AccessToken::new(request.access_token).map_err(|_| MedLedgerError::Unauthorized)?;
    let key = DecryptionKey::parse(&request.patient_key).map_err(MedLedgerError::from)?;

    let response = gateway
        .consult_with_token(&patient, &token, &key, &request.query)
        .await?;

    Ok(Json(HealthAssistantResponse { response }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::adapters::{AesGcmCipher, InMemoryLedger, SqliteContentStore};
    use crate::domain::kdf::KdfParams;
    use crate::ports::ModelError;

    const PATIENT: &str = "0x90f79bf6eb2c4f870365e785982e1f101e93b906";
    const ADMIN: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    struct EchoModel;

    impl LanguageModel for EchoModel {
        async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
            Ok(format!("answered {} chars", prompt.len()))
        }
    }

    async fn spawn_server() -> (String, Arc<InMemoryLedger>) {
        let cipher = Arc::new(AesGcmCipher::with_kdf_params(KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }));
        let store = Arc::new(SqliteContentStore::in_memory().expect("Should create db"));
        let ledger = Arc::new(InMemoryLedger::new(Address::parse(ADMIN).expect("valid")));
        let patient = Address::parse(PATIENT).expect("valid");

        let profile = br#"{"patientName":"Ola Nordmann","medicalConditions":"Migraine"}"#;
        let blob = cipher
            .encrypt(profile, &DecryptionKey::parse("k1").expect("valid"))
            .expect("Should encrypt");
        let id = store
            .put(blob.to_bytes().expect("Should encode"))
            .await
            .expect("Should put");
        ledger.set_patient_data(&patient, &id).await.expect("Should set");

        let gateway = Arc::new(ConsultationGateway::new(
            cipher,
            store,
            Arc::clone(&ledger),
            Arc::new(EchoModel),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind");
        let addr = listener.local_addr().expect("Should have addr");
        tokio::spawn(async move {
            axum::serve(listener, router(gateway)).await.expect("Server");
        });
        (format!("http://{addr}{HEALTH_ASSISTANT_PATH}"), ledger)
    }

    async fn post_json(url: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Client")
            .post(url)
            .json(&body)
            .send()
            .await
            .expect("Should send");
        let status = response.status().as_u16();
        (status, response.json().await.expect("JSON body"))
    }

    async fn token(ledger: &InMemoryLedger) -> String {
        ledger
            .generate_access_token(&Address::parse(PATIENT).expect("valid"))
            .await
            .expect("Should issue")
            .as_str()
            .to_string()
    }

    #[tokio::test]
    async fn test_authorized_consultation() {
        let (url, ledger) = spawn_server().await;
        let (status, body) = post_json(
            &url,
            serde_json::json!({
                "patientAddress": PATIENT,
                "patientKey": "k1",
                "query": "What triggers migraines?",
                "accessToken": token(&ledger).await,
            }),
        )
        .await;

        assert_eq!(status, 200);
        assert!(body["response"].as_str().expect("response").starts_with("answered"));
    }

    #[tokio::test]
    async fn test_invalid_token_is_forbidden() {
        let (url, _ledger) = spawn_server().await;
        let (status, body) = post_json(
            &url,
            serde_json::json!({
                "patientAddress": PATIENT,
                "patientKey": "k1",
                "query": "What triggers migraines?",
                "accessToken": "0xdeadbeef",
            }),
        )
        .await;

        assert_eq!(status, 403);
        assert_eq!(body["error"], "Unauthorized access");
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let (url, ledger) = spawn_server().await;
        let token = token(&ledger).await;
        let body = serde_json::json!({
            "patientAddress": PATIENT,
            "patientKey": "k1",
            "query": "What triggers migraines?",
            "accessToken": token,
        });

        assert_eq!(post_json(&url, body.clone()).await.0, 200);
        assert_eq!(post_json(&url, body).await.0, 403);
    }

    #[tokio::test]
    async fn test_wrong_key_is_server_error_without_details() {
        let (url, ledger) = spawn_server().await;
        let (status, body) = post_json(
            &url,
            serde_json::json!({
                "patientAddress": PATIENT,
                "patientKey": "k2",
                "query": "What triggers migraines?",
                "accessToken": token(&ledger).await,
            }),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body["error"], "Decryption failed");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_server_error() {
        let (url, ledger) = spawn_server().await;

        let (status, body) = post_json(
            &url,
            serde_json::json!({
                "patientAddress": PATIENT,
                "query": "What triggers migraines?",
                "accessToken": token(&ledger).await,
            }),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Invalid request");

        let (status, body) = post_json(
            &url,
            serde_json::json!({
                "patientAddress": PATIENT,
                "patientKey": "k1",
                "query": "What triggers migraines?",
                "accessToken": null,
            }),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Invalid request");

        let response = reqwest::Client::new()
            .post(&url)
            .body("not json")
            .send()
            .await
            .expect("Should send");
        assert_eq!(response.status().as_u16(), 500);
        let body: ErrorBody = response.json().await.expect("JSON body");
        assert_eq!(body.error, "Invalid request");
    }

    #[test]
    fn test_request_debug_hides_secrets() {
        let request: HealthAssistantRequest = serde_json::from_value(serde_json::json!({
            "patientAddress": PATIENT,
            "patientKey": "super-secret-passphrase",
            "query": "q",
            "accessToken": "0xtoken-value",
        }))
        .expect("Should parse");
        let debug = format!("{request:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("token-value"));
    }
}
