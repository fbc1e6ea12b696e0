//! Record command-line client.
//!
//! Drives the record workflow against the configured ledger and content
//! store, acting as `MEDLEDGER_ACCOUNT`.
//!
//! # Usage
//!
//! ```bash
//! records register-doctor <address>
//! records add --patient <address> --type "Lab Report" --doctor-name <name> --file <path>
//!             [--file-type <mime>] [--description <text>]
//! records list [--patient <address>]
//! records view --id <record-id> [--patient <address>] [--out <path>]
//! records publish-profile --file <profile.json>
//! records consult --query <text> [--patient <address>]
//! ```
//!
//! # Security
//!
//! Record keys are read from `--key-file <path>` or `MEDLEDGER_RECORD_KEY`,
//! never from other command-line arguments.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

use medledger::adapters::sanitize::SanitizingMakeWriter;
use medledger::adapters::{
    AesGcmCipher, ContentStoreBackend, IpfsContentStore, JsonRpcLedger, OpenAiConfig, OpenAiModel,
    SqliteContentStore,
};
use medledger::application::{ConsultationGateway, RecordWorkflow};
use medledger::config::{self, Settings, StoreKind};
use medledger::domain::{Address, DecryptionKey, RecordSubmission, RecordType, SessionContext};

const USAGE: &str = "Usage: records <register-doctor|add|list|view|publish-profile|consult> [options]\n\
Run `records --help` for details.";

const RECORD_KEY_ENV: &str = "MEDLEDGER_RECORD_KEY";

type Workflow = RecordWorkflow<AesGcmCipher, ContentStoreBackend, JsonRpcLedger>;

struct Command {
    name: String,
    positional: Vec<String>,
    flags: HashMap<String, String>,
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let name = args.next().ok_or_else(|| anyhow!(USAGE))?;
        let mut positional = Vec::new();
        let mut flags = HashMap::new();

        while let Some(arg) = args.next() {
            if let Some(flag) = arg.strip_prefix("--") {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing value for --{flag}"))?;
                flags.insert(flag.to_string(), value);
            } else {
                positional.push(arg);
            }
        }

        Ok(Self {
            name,
            positional,
            flags,
        })
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.flag(name)
            .ok_or_else(|| anyhow!("--{name} is required for {}", self.name))
    }
}

fn parse_address(value: &str) -> Result<Address> {
    Address::parse(value).map_err(anyhow::Error::msg)
}

fn read_key(command: &Command) -> Result<DecryptionKey> {
    let secret = match command.flag("key-file") {
        Some(path) => Zeroizing::new(
            std::fs::read_to_string(path).with_context(|| format!("Failed to read key file {path}"))?,
        ),
        None => Zeroizing::new(
            std::env::var(RECORD_KEY_ENV)
                .map_err(|_| anyhow!("Provide --key-file <path> or set {RECORD_KEY_ENV}"))?,
        ),
    };
    Ok(DecryptionKey::parse(secret.trim_end_matches(['\n', '\r']))?)
}

fn build_store(settings: &Settings) -> Result<ContentStoreBackend> {
    Ok(match settings.store {
        StoreKind::Ipfs => ContentStoreBackend::Ipfs(IpfsContentStore::new(
            settings.ipfs_url.clone(),
            settings.http_timeout,
        )?),
        StoreKind::Sqlite => {
            ContentStoreBackend::Sqlite(SqliteContentStore::new(&settings.store_path)?)
        }
    })
}

fn print_help() {
    println!(
        "{USAGE}\n\n\
Commands:\n  \
register-doctor <address>         Grant the doctor role (admin only)\n  \
add --patient --type --doctor-name --file [--file-type] [--description]\n                                    \
Encrypt, store and register a record\n  \
list [--patient]                  List records (defaults to the acting account)\n  \
view --id [--patient] [--out]     Decrypt a record to --out or stdout\n  \
publish-profile --file            Encrypt and publish your medical profile JSON\n  \
consult --query [--patient]       Ask the AI health assistant\n\n\
Keys: --key-file <path> or {RECORD_KEY_ENV}. Record types: {}",
        RecordType::SELECTABLE
            .iter()
            .map(RecordType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(SanitizingMakeWriter::new(std::io::stderr)),
        )
        .init();

    let command = Command::parse(args.into_iter())?;
    let settings = Settings::from_env()?;
    let account = settings.require_account()?.clone();

    let cipher = Arc::new(AesGcmCipher::with_kdf_params(settings.kdf));
    let store = Arc::new(build_store(&settings)?);
    let ledger = Arc::new(JsonRpcLedger::new(
        settings.ledger_url.clone(),
        settings.require_contract()?.as_str(),
        settings.http_timeout,
    )?);

    let workflow: Workflow = RecordWorkflow::new(
        SessionContext::new(account.clone()),
        Arc::clone(&cipher),
        Arc::clone(&store),
        Arc::clone(&ledger),
    );
    let patient_or_self = |command: &Command| -> Result<Address> {
        command
            .flag("patient")
            .map_or_else(|| Ok(account.clone()), parse_address)
    };

    match command.name.as_str() {
        "register-doctor" => {
            let doctor = command
                .positional
                .first()
                .ok_or_else(|| anyhow!("register-doctor needs an address"))?;
            let receipt = workflow.register_doctor(&parse_address(doctor)?).await?;
            println!("Doctor registered in tx {}", receipt.transaction_hash);
        }
        "add" => {
            let file_path = command.required("file")?;
            let submission = RecordSubmission {
                patient: parse_address(command.required("patient")?)?,
                record_type: command
                    .required("type")?
                    .parse::<RecordType>()
                    .map_err(anyhow::Error::msg)?,
                doctor_name: command.required("doctor-name")?.to_string(),
                file: std::fs::read(file_path)
                    .with_context(|| format!("Failed to read {file_path}"))?,
                file_type: command.flag("file-type").map(str::to_string),
                description: command.flag("description").unwrap_or_default().to_string(),
            };
            let key = read_key(&command)?;
            let receipt = workflow.add_record(submission, &key).await?;
            println!(
                "Record stored as {} and registered in tx {}",
                receipt.content_id, receipt.receipt.transaction_hash
            );
        }
        "list" => {
            let patient = patient_or_self(&command)?;
            let records = workflow.list_records(&patient).await?;
            if records.is_empty() {
                println!("No records found.");
            }
            for record in records {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    record.id,
                    record.record_type,
                    record.doctor_name,
                    record.display_date(),
                    record.metadata.description.as_deref().unwrap_or("")
                );
            }
        }
        "view" => {
            let patient = patient_or_self(&command)?;
            let key = read_key(&command)?;
            let (record, plaintext) = workflow
                .read_record(&patient, command.required("id")?, &key)
                .await?;
            match command.flag("out") {
                Some(out) => {
                    std::fs::write(Path::new(out), plaintext.as_slice())
                        .with_context(|| format!("Failed to write {out}"))?;
                    eprintln!("Wrote {} record {} to {out}", record.record_type, record.id);
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(plaintext.as_slice())?;
                }
            }
        }
        "publish-profile" => {
            let file_path = command.required("file")?;
            let profile = Zeroizing::new(
                std::fs::read(file_path).with_context(|| format!("Failed to read {file_path}"))?,
            );
            let key = read_key(&command)?;
            let receipt = workflow.publish_medical_profile(&profile, &key).await?;
            println!(
                "Profile stored as {} and published in tx {}",
                receipt.content_id, receipt.receipt.transaction_hash
            );
        }
        "consult" => {
            let patient = patient_or_self(&command)?;
            let query = command.required("query")?;
            let key = read_key(&command)?;
            let model = Arc::new(OpenAiModel::new(OpenAiConfig {
                base_url: settings.llm_base_url.clone(),
                model: settings.llm_model.clone(),
                temperature: settings.llm_temperature,
                api_key: config::load_llm_api_key()?,
                timeout: settings.http_timeout,
            })?);
            let gateway = ConsultationGateway::new(cipher, store, ledger, model);
            println!("{}", gateway.consult(&patient, &key, query).await?);
        }
        other => bail!("Unknown command: {other}\n{USAGE}"),
    }

    Ok(())
}
