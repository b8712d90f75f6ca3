//! AssemblyAI v3 streaming protocol types
//!
//! This module defines the message types for communicating with the
//! AssemblyAI real-time transcription service over WebSocket.
//!
//! # Protocol Overview
//!
//! 1. Connect to `wss://streaming.assemblyai.com/v3/ws` with `sample_rate`,
//!    `encoding`, and `token` query parameters
//! 2. Receive a `Begin` event carrying the session id and expiry
//! 3. Stream binary frames of 16-bit PCM little-endian audio
//! 4. Receive `Turn` events with incremental transcripts; `end_of_turn`
//!    marks the final transcript for that turn
//! 5. Send `{"type":"Terminate"}` to end the stream; the server replies
//!    with a `Termination` event and closes

use serde::{Deserialize, Serialize};

/// AssemblyAI v3 streaming endpoint (query parameters appended at connect)
pub const STREAMING_API_URL: &str = "wss://streaming.assemblyai.com/v3/ws";

/// Sample rate the interview pipeline captures at (Hz)
pub const STREAM_SAMPLE_RATE: u32 = 16_000;

/// PCM encoding tag sent in the connect query string
pub const STREAM_ENCODING: &str = "pcm_s16le";

/// Build the full WebSocket URL with connection parameters.
///
/// The token may be a short-lived token from the backend side-channel or
/// the long-lived API key when the side-channel is unavailable.
pub fn connect_url(sample_rate: u32, token: &str) -> String {
    format!(
        "{}?sample_rate={}&encoding={}&token={}",
        STREAMING_API_URL, sample_rate, STREAM_ENCODING, token
    )
}

/// Encode PCM samples as little-endian bytes for a binary frame.
///
/// The wire format is signed 16-bit little-endian regardless of host byte
/// order; `to_le_bytes` guarantees that on every platform.
pub fn pcm_frame_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

// ============================================================================
// Client Messages (sent TO AssemblyAI)
// ============================================================================

/// Control messages sent from client to the streaming service.
///
/// Audio itself is not a JSON message; it travels as raw binary frames
/// built by [`pcm_frame_bytes`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// End the stream; the server finalizes any pending turn and terminates
    Terminate,
}

// ============================================================================
// Server Messages (received FROM AssemblyAI)
// ============================================================================

/// Messages received from the streaming service, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Session established; connect() resolves only after this arrives
    Begin {
        /// Provider-assigned session id
        id: String,
        /// Unix timestamp after which the session expires
        #[serde(default)]
        expires_at: Option<f64>,
    },

    /// A unit of speech demarcated by silence, with incremental transcript
    Turn {
        /// Best transcript for the turn so far (interim until end_of_turn)
        #[serde(default)]
        transcript: String,
        /// True when this is the final transcript for the turn
        #[serde(default)]
        end_of_turn: bool,
        /// Provider confidence for the transcript, when reported
        #[serde(default)]
        confidence: Option<f32>,
    },

    /// Stream ended (in response to Terminate or server-side teardown)
    Termination {
        #[serde(default)]
        audio_duration_seconds: Option<f64>,
    },

    /// Protocol or service error
    Error {
        #[serde(default)]
        error: String,
    },

    /// Catch-all so future message types don't fail deserialization
    #[serde(other)]
    Unknown,
}

/// A uniform transcript event surfaced to the session controller.
///
/// Derived from `Turn` messages: `is_final` comes from `end_of_turn`.
/// Interim events for a turn always precede that turn's final event.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: Option<f32>,
}

impl ServerMessage {
    /// Convert a `Turn` into the uniform transcript event, `None` otherwise
    pub fn transcript_event(&self) -> Option<TranscriptEvent> {
        match self {
            ServerMessage::Turn {
                transcript,
                end_of_turn,
                confidence,
            } => Some(TranscriptEvent {
                text: transcript.clone(),
                is_final: *end_of_turn,
                confidence: *confidence,
            }),
            _ => None,
        }
    }

    /// Session id if this is a `Begin` message
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Begin { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_parameters() {
        let url = connect_url(16_000, "tok123");
        assert!(url.starts_with("wss://streaming.assemblyai.com/v3/ws?"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("encoding=pcm_s16le"));
        assert!(url.contains("token=tok123"));
    }

    #[test]
    fn test_pcm_frame_bytes_little_endian() {
        // 0x1234 -> [0x34, 0x12], 0x5678 -> [0x78, 0x56]
        let bytes = pcm_frame_bytes(&[0x1234, 0x5678]);
        assert_eq!(bytes, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn test_pcm_frame_bytes_negative_sample() {
        // -1 is 0xFFFF in two's complement
        let bytes = pcm_frame_bytes(&[-1]);
        assert_eq!(bytes, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_terminate_serialization() {
        let json = serde_json::to_string(&ClientMessage::Terminate).unwrap();
        assert_eq!(json, r#"{"type":"Terminate"}"#);
    }

    #[test]
    fn test_begin_deserialization() {
        let json = r#"{
            "type": "Begin",
            "id": "sess_abc",
            "expires_at": 1727000000.0
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        match msg {
            ServerMessage::Begin { id, expires_at } => {
                assert_eq!(id, "sess_abc");
                assert_eq!(expires_at, Some(1727000000.0));
            }
            _ => panic!("Expected Begin"),
        }
        assert_eq!(
            serde_json::from_str::<ServerMessage>(json)
                .unwrap()
                .session_id(),
            Some("sess_abc")
        );
    }

    #[test]
    fn test_turn_interim_deserialization() {
        let json = r#"{
            "type": "Turn",
            "transcript": "hello wor",
            "end_of_turn": false
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let event = msg.transcript_event().expect("Turn yields an event");

        assert_eq!(event.text, "hello wor");
        assert!(!event.is_final);
        assert!(event.confidence.is_none());
    }

    #[test]
    fn test_turn_final_deserialization() {
        let json = r#"{
            "type": "Turn",
            "transcript": "hello world",
            "end_of_turn": true,
            "confidence": 0.97
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let event = msg.transcript_event().unwrap();

        assert_eq!(event.text, "hello world");
        assert!(event.is_final);
        assert_eq!(event.confidence, Some(0.97));
    }

    #[test]
    fn test_termination_deserialization() {
        let json = r#"{"type": "Termination", "audio_duration_seconds": 12.5}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        match msg {
            ServerMessage::Termination {
                audio_duration_seconds,
            } => assert_eq!(audio_duration_seconds, Some(12.5)),
            _ => panic!("Expected Termination"),
        }
    }

    #[test]
    fn test_error_deserialization() {
        let json = r#"{"type": "Error", "error": "Invalid token"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert!(msg.is_error());
        match msg {
            ServerMessage::Error { error } => assert_eq!(error, "Invalid token"),
            _ => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_unknown_type_does_not_fail() {
        let json = r#"{"type": "SomeFutureEvent", "data": 1}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ServerMessage::Unknown));
    }
}
