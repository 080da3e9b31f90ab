//! Error handling for the job ranker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeenEyeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Vector index has not been built")]
    IndexNotBuilt,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation error: {0}")]
    Embedding(String),

    #[error("LLM inference error: {0}")]
    LlmInference(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF extraction error: {0}")]
    PdfExtraction(String),

    #[error("DOCX extraction error: {0}")]
    DocxExtraction(String),

    #[error("File format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Output formatting error: {0}")]
    OutputFormatting(String),
}

pub type Result<T> = std::result::Result<T, KeenEyeError>;

impl KeenEyeError {
    /// Whether a retry has any chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KeenEyeError::Network(_) | KeenEyeError::Timeout(_) | KeenEyeError::RateLimited(_)
        )
    }
}

/// Convert reqwest errors, keeping the transient/terminal distinction
impl From<reqwest::Error> for KeenEyeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return KeenEyeError::Timeout(err.to_string());
        }
        if err.is_decode() {
            return KeenEyeError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return status_error(status.as_u16(), err.to_string());
        }
        KeenEyeError::Network(err.to_string())
    }
}

/// Map an HTTP status code from a provider onto an error variant
pub fn status_error(status: u16, message: String) -> KeenEyeError {
    match status {
        429 => KeenEyeError::RateLimited(message),
        500..=599 => KeenEyeError::Network(format!("HTTP {}: {}", status, message)),
        _ => KeenEyeError::Provider { status, message },
    }
}
