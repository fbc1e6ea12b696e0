//! medledger: AI consultation gateway over encrypted medical records.
//!
//! Main entry point for the HTTP service.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medledger::adapters::sanitize::SanitizingMakeWriter;
use medledger::adapters::{
    AesGcmCipher, ContentStoreBackend, IpfsContentStore, JsonRpcLedger, OpenAiConfig, OpenAiModel,
    SqliteContentStore,
};
use medledger::api;
use medledger::application::ConsultationGateway;
use medledger::config::{self, Settings, StoreKind};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stdout unless MEDLEDGER_LOG_MODE=file.
    let use_file = std::env::var("MEDLEDGER_LOG_MODE").is_ok_and(|mode| mode == "file");

    let (writer, _guard) = if use_file {
        let log_file = std::env::var("MEDLEDGER_LOG_FILE")
            .unwrap_or_else(|_| "/app/data/medledger.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let settings = Settings::from_env()?;
    tracing::info!("Starting medledger...");

    let cipher = Arc::new(AesGcmCipher::with_kdf_params(settings.kdf));

    let store = Arc::new(match settings.store {
        StoreKind::Ipfs => ContentStoreBackend::Ipfs(IpfsContentStore::new(
            settings.ipfs_url.clone(),
            settings.http_timeout,
        )?),
        StoreKind::Sqlite => {
            ContentStoreBackend::Sqlite(SqliteContentStore::new(&settings.store_path)?)
        }
    });

    let ledger = Arc::new(JsonRpcLedger::new(
        settings.ledger_url.clone(),
        settings.require_contract()?.as_str(),
        settings.http_timeout,
    )?);

    let model = Arc::new(OpenAiModel::new(OpenAiConfig {
        base_url: settings.llm_base_url.clone(),
        model: settings.llm_model.clone(),
        temperature: settings.llm_temperature,
        api_key: config::load_llm_api_key()?,
        timeout: settings.http_timeout,
    })?);

    let gateway = Arc::new(ConsultationGateway::new(cipher, store, ledger, model));

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    tracing::info!("Secure AI integration service running on {}", settings.bind);

    axum::serve(listener, api::router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("medledger shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
