//! Language model port: Trait for text completion.

use std::future::Future;

/// Errors from the language-model API.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Language model unavailable: {0}")]
    Unavailable(String),

    #[error("Language model rejected the request (status {status})")]
    Rejected { status: u16 },

    #[error("Invalid language model response: {0}")]
    InvalidResponse(String),
}

/// Trait for a stateless completion API.
///
/// Every call is independent; no conversation memory is kept.
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt.
    ///
    /// # Errors
    /// Returns `ModelError` if the API cannot produce a completion.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, ModelError>> + Send;
}
