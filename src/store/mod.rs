//! Session persistence via the Supabase REST API
//!
//! Tables: `sessions`, `questions`, `answers`, `transcripts`, `profiles`.
//! Edge functions `extract-nlp-data` and `recompute-profile` run the
//! heavier processing server side.
//!
//! Persistence is best effort: a store failure never interrupts the
//! interview. Callers log [`StoreError`] and move on.

mod client;
mod types;

pub use client::StoreClient;
pub use types::{QuestionRow, SessionRow};

/// Errors from the persistence backend
#[derive(Debug)]
pub enum StoreError {
    /// Network/HTTP error before a response was received
    NetworkError(String),
    /// The store returned an error status
    Backend { status: u16, message: String },
    /// Failed to parse the response body
    ParseError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NetworkError(e) => write!(f, "Store network error: {}", e),
            StoreError::Backend { status, message } => {
                write!(f, "Store error ({}): {}", status, message)
            }
            StoreError::ParseError(e) => write!(f, "Failed to parse store response: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Backend {
            status: 409,
            message: "duplicate key".to_string(),
        };
        assert!(err.to_string().contains("409"));
        assert!(err.to_string().contains("duplicate key"));
    }
}
