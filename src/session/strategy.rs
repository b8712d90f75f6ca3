//! Transcription strategy selection
//!
//! Two ways to turn a finished recording attempt into text: the streaming
//! transcript aggregated live over the socket, or a batch upload of the
//! WAV clip. The active mode is held by [`StrategyPolicy`]; a streaming
//! failure demotes the session to batch exactly once and it never flaps
//! back, even if a later connect would have succeeded.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::api::ApiClient;
use crate::audio::{analyze_wav_for_speech, evaluate_speech_gate};

/// Which transcription path the session is using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionMode {
    Streaming,
    Batch,
}

/// Per-session strategy holder with one-shot fallback.
#[derive(Debug, Clone)]
pub struct StrategyPolicy {
    mode: TranscriptionMode,
    fell_back: bool,
}

impl StrategyPolicy {
    /// Streaming is preferred when a credential source is configured.
    pub fn new(streaming_available: bool) -> Self {
        let mode = if streaming_available {
            TranscriptionMode::Streaming
        } else {
            log::info!("No streaming credentials; using batch transcription");
            TranscriptionMode::Batch
        };
        Self {
            mode,
            fell_back: false,
        }
    }

    pub fn mode(&self) -> TranscriptionMode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.mode == TranscriptionMode::Streaming
    }

    /// Demote to batch after a streaming setup failure. Idempotent;
    /// returns true only on the first demotion.
    pub fn note_streaming_failure(&mut self) -> bool {
        if self.mode != TranscriptionMode::Streaming {
            return false;
        }
        log::warn!("Streaming failed; falling back to batch transcription for this session");
        self.mode = TranscriptionMode::Batch;
        self.fell_back = true;
        true
    }

    /// Whether this session already used its one fallback
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }
}

/// A recording attempt after capture teardown.
#[derive(Debug, Clone)]
pub struct FinishedAttempt {
    /// Always present: the WAV is written even on the streaming path
    pub wav_path: PathBuf,
    /// Aggregated streaming transcript, when the attempt streamed
    pub streaming_transcript: Option<String>,
}

/// Errors from producing a transcript
#[derive(Debug, Clone)]
pub enum TranscribeError {
    /// The clip contains no usable speech; not a failure, prompts a retry
    NoSpeech { message: String },
    Failed(String),
}

impl std::fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscribeError::NoSpeech { message } => write!(f, "{}", message),
            TranscribeError::Failed(e) => write!(f, "Transcription failed: {}", e),
        }
    }
}

impl std::error::Error for TranscribeError {}

/// Produces the final transcript for a finished attempt.
#[async_trait]
pub trait TranscriptionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, attempt: &FinishedAttempt) -> Result<String, TranscribeError>;
}

/// Uses the transcript already aggregated over the streaming socket; no
/// further network work at stop time.
pub struct StreamingStrategy;

#[async_trait]
impl TranscriptionStrategy for StreamingStrategy {
    fn name(&self) -> &'static str {
        "streaming"
    }

    async fn transcribe(&self, attempt: &FinishedAttempt) -> Result<String, TranscribeError> {
        let text = attempt
            .streaming_transcript
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(TranscribeError::NoSpeech {
                message: "no speech detected".to_string(),
            });
        }
        Ok(text)
    }
}

/// Uploads the WAV clip for batch transcription. Silent clips are gated
/// locally so they never hit the network.
pub struct BatchStrategy {
    api: ApiClient,
}

impl BatchStrategy {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TranscriptionStrategy for BatchStrategy {
    fn name(&self) -> &'static str {
        "batch"
    }

    async fn transcribe(&self, attempt: &FinishedAttempt) -> Result<String, TranscribeError> {
        let path = attempt.wav_path.clone();
        let stats = tokio::task::spawn_blocking(move || analyze_wav_for_speech(&path))
            .await
            .map_err(|e| TranscribeError::Failed(e.to_string()))?
            .map_err(TranscribeError::Failed)?;

        let gate = evaluate_speech_gate(&stats);
        if !gate.contains_speech {
            log::info!(
                "Speech gate: no speech in clip ({}/{} frames, crest_factor={:.1})",
                gate.speech_frames,
                gate.total_frames,
                gate.crest_factor
            );
            return Err(TranscribeError::NoSpeech {
                message: "no speech detected".to_string(),
            });
        }

        let text = self
            .api
            .transcribe(&attempt.wav_path)
            .await
            .map_err(|e| TranscribeError::Failed(e.to_string()))?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TranscribeError::NoSpeech {
                message: "no speech detected".to_string(),
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_prefers_streaming_when_available() {
        let policy = StrategyPolicy::new(true);
        assert_eq!(policy.mode(), TranscriptionMode::Streaming);
        assert!(!policy.fell_back());
    }

    #[test]
    fn test_policy_batch_without_credentials() {
        let policy = StrategyPolicy::new(false);
        assert_eq!(policy.mode(), TranscriptionMode::Batch);
        // Starting on batch is not a fallback
        assert!(!policy.fell_back());
    }

    #[test]
    fn test_fallback_happens_once_and_sticks() {
        let mut policy = StrategyPolicy::new(true);

        assert!(policy.note_streaming_failure());
        assert_eq!(policy.mode(), TranscriptionMode::Batch);
        assert!(policy.fell_back());

        // Second failure report changes nothing
        assert!(!policy.note_streaming_failure());
        assert_eq!(policy.mode(), TranscriptionMode::Batch);
    }

    #[tokio::test]
    async fn test_streaming_strategy_returns_aggregate() {
        let attempt = FinishedAttempt {
            wav_path: PathBuf::from("/tmp/clip.wav"),
            streaming_transcript: Some("I grew up by the sea.".to_string()),
        };
        let text = StreamingStrategy.transcribe(&attempt).await.unwrap();
        assert_eq!(text, "I grew up by the sea.");
    }

    #[tokio::test]
    async fn test_streaming_strategy_empty_is_no_speech() {
        let attempt = FinishedAttempt {
            wav_path: PathBuf::from("/tmp/clip.wav"),
            streaming_transcript: Some("   ".to_string()),
        };
        let err = StreamingStrategy.transcribe(&attempt).await.unwrap_err();
        assert!(matches!(err, TranscribeError::NoSpeech { .. }));
    }

    #[tokio::test]
    async fn test_batch_strategy_gates_silent_clip_before_upload() {
        // Silent clip: the gate rejects locally, so the unroutable backend
        // address is never contacted.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..16_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let strategy = BatchStrategy::new(ApiClient::new("http://127.0.0.1:1/api"));
        let attempt = FinishedAttempt {
            wav_path: path,
            streaming_transcript: None,
        };

        let err = strategy.transcribe(&attempt).await.unwrap_err();
        assert!(matches!(err, TranscribeError::NoSpeech { .. }));
    }
}
