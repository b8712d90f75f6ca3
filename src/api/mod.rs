//! HTTP client for the interview backend
//!
//! The backend handles everything that needs a secret or a GPU: batch
//! transcription, answer analysis, text-to-speech synthesis, and minting
//! short-lived streaming tokens. All endpoints return JSON with a
//! `success` flag on the happy path and `{"error": ...}` otherwise.

mod client;

pub use client::{
    AnalysisResponse, ApiClient, ContentType, SessionEntry, Voice, DEFAULT_API_BASE_URL,
};

/// Errors from backend API calls
#[derive(Debug)]
pub enum ApiError {
    /// Network/HTTP error before a response was received
    NetworkError(String),
    /// The backend returned an error status
    Backend { status: u16, message: String },
    /// Failed to parse the response body
    ParseError(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NetworkError(e) => write!(f, "Network error: {}", e),
            ApiError::Backend { status, message } => {
                write!(f, "Backend error ({}): {}", status, message)
            }
            ApiError::ParseError(e) => write!(f, "Failed to parse API response: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Backend {
            status: 503,
            message: "model warming up".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model warming up"));
    }
}
