//! Audio capture, framing, and local speech analysis

pub mod capture;
pub mod frame;
pub mod paths;
pub mod vad;

pub use capture::{AudioCaptureManager, CaptureConfig, CaptureHandle, FrameSender};
pub use frame::FrameChunker;
pub use vad::{analyze_wav_for_speech, evaluate_speech_gate, SpeechGate, VadStats};

/// Errors from the capture pipeline
#[derive(Debug, Clone)]
pub enum AudioError {
    /// No input device, or the platform denied access to it
    MicrophoneUnavailable,
    /// The device offers no input config we can use
    NoSupportedConfig,
    /// Failed to build or start the input stream
    StreamCreationFailed(String),
    /// Failed to create the WAV file or its directory
    FileCreationFailed(String),
    /// Failed to write or finalize the WAV file
    WriteFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::MicrophoneUnavailable => {
                write!(
                    f,
                    "No microphone available. Check that a microphone is connected and the app has permission to use it."
                )
            }
            AudioError::NoSupportedConfig => {
                write!(f, "Microphone does not support a usable input format")
            }
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to start audio capture: {}", e)
            }
            AudioError::FileCreationFailed(e) => {
                write!(f, "Failed to create recording file: {}", e)
            }
            AudioError::WriteFailed(e) => {
                write!(f, "Failed to write recording: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::MicrophoneUnavailable;
        assert!(err.to_string().contains("microphone"));

        let err = AudioError::StreamCreationFailed("device busy".to_string());
        assert!(err.to_string().contains("device busy"));
    }
}
