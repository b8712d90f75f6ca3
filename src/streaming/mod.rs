//! Streaming transcription module for real-time speech-to-text
//!
//! This module provides WebSocket-based streaming to the AssemblyAI v3
//! real-time API, surfacing interim transcripts while the user is still
//! speaking.
//!
//! # Architecture
//!
//! ```text
//! Microphone frames (16kHz PCM) ──▶ StreamingClient ──▶ binary frames (WS)
//!                                        │
//!                                        ▼ server JSON messages
//!                                  StreamingEvent channel
//!                                        │
//!                                        ▼
//!                                TranscriptAggregator
//! ```
//!
//! # Fallback Strategy
//!
//! Connection or handshake failure is terminal for the recording attempt;
//! the session controller falls back to batch transcription once per
//! session and never flaps back.

mod aggregator;
mod client;
mod protocol;

pub use aggregator::TranscriptAggregator;
pub use client::{resolve_stream_token, StreamingClient, StreamingEvent};
pub use protocol::{
    connect_url, pcm_frame_bytes, ClientMessage, ServerMessage, TranscriptEvent,
    STREAM_SAMPLE_RATE,
};

/// Errors that can occur during streaming transcription
#[derive(Debug, Clone)]
pub enum StreamingError {
    /// No temporary token and no long-lived API key available
    MissingCredentials,
    /// Failed to establish the WebSocket connection or Begin timed out
    ConnectionFailed(String),
    /// The service rejected the session during the handshake
    HandshakeRejected(String),
    /// WebSocket protocol error
    ProtocolError(String),
    /// Connection was closed unexpectedly
    Disconnected(String),
    /// Failed to send an audio frame
    SendFailed(String),
}

impl std::fmt::Display for StreamingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingError::MissingCredentials => {
                write!(
                    f,
                    "Streaming credentials not configured. Set ASSEMBLYAI_API_KEY or configure the backend token endpoint."
                )
            }
            StreamingError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to streaming service: {}", e)
            }
            StreamingError::HandshakeRejected(e) => {
                write!(f, "Streaming handshake rejected: {}", e)
            }
            StreamingError::ProtocolError(e) => {
                write!(f, "WebSocket protocol error: {}", e)
            }
            StreamingError::Disconnected(e) => {
                write!(f, "WebSocket disconnected: {}", e)
            }
            StreamingError::SendFailed(e) => {
                write!(f, "Failed to send audio: {}", e)
            }
        }
    }
}

impl std::error::Error for StreamingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_error_display() {
        let err = StreamingError::MissingCredentials;
        assert!(err.to_string().contains("ASSEMBLYAI_API_KEY"));

        let err = StreamingError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = StreamingError::HandshakeRejected("bad token".to_string());
        assert!(err.to_string().contains("bad token"));
    }
}
