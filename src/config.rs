//! Environment configuration.
//!
//! Every setting has a `MEDLEDGER_*` variable and a default suitable for a
//! local node. Secrets are never taken from plain variables in release
//! builds.
//!
//! # Language-model API key
//!
//! Precedence (highest first):
//! - `MEDLEDGER_LLM_API_KEY_FILE` (read from a file path)
//! - `/run/secrets/medledger_llm_api_key` (Docker/Compose secret default)
//! - `OPENAI_API_KEY` (debug builds only)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zeroize::Zeroizing;

use crate::adapters::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::domain::kdf::{KdfParams, MAX_MEMORY_KIB};
use crate::domain::Address;

const LLM_API_KEY_FILE_ENV: &str = "MEDLEDGER_LLM_API_KEY_FILE";
const LLM_API_KEY_DOCKER_SECRET_PATH: &str = "/run/secrets/medledger_llm_api_key";

// Dev-only escape hatch for local runs.
const LLM_API_KEY_ENV_DEV: &str = "OPENAI_API_KEY";

const DEFAULT_PORT: u16 = 3001;

/// Errors while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error(
        "Missing language model API key: provide {LLM_API_KEY_FILE_ENV} (or mount {LLM_API_KEY_DOCKER_SECRET_PATH})"
    )]
    MissingApiKey,

    #[error("Failed to read secret: {0}")]
    SecretRead(#[from] std::io::Error),
}

/// Which content store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Ipfs,
    Sqlite,
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub ledger_url: String,
    pub contract_address: Option<Address>,
    /// Account the service acts as on the ledger
    pub account: Option<Address>,
    pub store: StoreKind,
    pub ipfs_url: String,
    pub store_path: PathBuf,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub http_timeout: Duration,
    pub kdf: KdfParams,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = match (var("MEDLEDGER_BIND"), var("PORT")) {
            (Some(bind), _) => parse("MEDLEDGER_BIND", &bind)?,
            (None, Some(port)) => {
                SocketAddr::from(([0, 0, 0, 0], parse::<u16>("PORT", &port)?))
            }
            (None, None) => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        };

        let address = |name: &'static str| -> Result<Option<Address>, ConfigError> {
            var(name)
                .map(|v| Address::parse(&v).map_err(|reason| ConfigError::Invalid { var: name, reason }))
                .transpose()
        };

        let store = match var("MEDLEDGER_STORE").as_deref() {
            None | Some("ipfs") => StoreKind::Ipfs,
            Some("sqlite") => StoreKind::Sqlite,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "MEDLEDGER_STORE",
                    reason: format!("expected ipfs or sqlite, got {other}"),
                })
            }
        };

        let mut kdf = KdfParams::default();
        if let Some(m) = var("MEDLEDGER_KDF_MEMORY_KIB") {
            kdf.memory_kib = parse("MEDLEDGER_KDF_MEMORY_KIB", &m)?;
            if kdf.memory_kib > MAX_MEMORY_KIB {
                return Err(ConfigError::Invalid {
                    var: "MEDLEDGER_KDF_MEMORY_KIB",
                    reason: format!("must be at most {MAX_MEMORY_KIB}"),
                });
            }
        }

        let timeout_secs = match var("MEDLEDGER_HTTP_TIMEOUT_SECS") {
            Some(v) => parse::<u64>("MEDLEDGER_HTTP_TIMEOUT_SECS", &v)?,
            None => 30,
        };

        Ok(Self {
            bind,
            ledger_url: var("MEDLEDGER_LEDGER_URL")
                .unwrap_or_else(|| "http://localhost:8545".to_string()),
            contract_address: address("MEDLEDGER_CONTRACT_ADDRESS")?,
            account: address("MEDLEDGER_ACCOUNT")?,
            store,
            ipfs_url: var("MEDLEDGER_IPFS_URL").unwrap_or_else(|| "http://localhost:5001".to_string()),
            store_path: var("MEDLEDGER_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("medledger-blobs.db")),
            llm_base_url: var("MEDLEDGER_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            llm_model: var("MEDLEDGER_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_temperature: match var("MEDLEDGER_LLM_TEMPERATURE") {
                Some(t) => parse("MEDLEDGER_LLM_TEMPERATURE", &t)?,
                None => DEFAULT_TEMPERATURE,
            },
            http_timeout: Duration::from_secs(timeout_secs),
            kdf,
        })
    }

    /// The contract address, required for the JSON-RPC ledger.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` if unset.
    pub fn require_contract(&self) -> Result<&Address, ConfigError> {
        self.contract_address
            .as_ref()
            .ok_or(ConfigError::Missing("MEDLEDGER_CONTRACT_ADDRESS"))
    }

    /// The acting ledger account.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` if unset.
    pub fn require_account(&self) -> Result<&Address, ConfigError> {
        self.account
            .as_ref()
            .ok_or(ConfigError::Missing("MEDLEDGER_ACCOUNT"))
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

/// Load the language-model API key.
///
/// # Errors
/// Returns `ConfigError::MissingApiKey` if no source provides a non-empty key.
pub fn load_llm_api_key() -> Result<Zeroizing<String>, ConfigError> {
    load_secret(
        |name| std::env::var(name).ok(),
        Path::new(LLM_API_KEY_DOCKER_SECRET_PATH),
    )
}

fn load_secret(
    lookup: impl Fn(&str) -> Option<String>,
    docker_secret: &Path,
) -> Result<Zeroizing<String>, ConfigError> {
    // 1) Explicit file path
    if let Some(path) = lookup(LLM_API_KEY_FILE_ENV) {
        let content = Zeroizing::new(std::fs::read_to_string(path.trim())?);
        return non_empty(&content);
    }

    // 2) Docker secrets default path
    if docker_secret.exists() {
        let content = Zeroizing::new(std::fs::read_to_string(docker_secret)?);
        return non_empty(&content);
    }

    // 3) Dev-only env var (refused in release builds)
    if cfg!(debug_assertions) {
        if let Some(v) = lookup(LLM_API_KEY_ENV_DEV) {
            return non_empty(&Zeroizing::new(v));
        }
    }

    Err(ConfigError::MissingApiKey)
}

fn non_empty(raw: &str) -> Result<Zeroizing<String>, ConfigError> {
    let secret = raw.trim_end_matches(['\n', '\r']);
    if secret.is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    Ok(Zeroizing::new(secret.to_string()))
}
