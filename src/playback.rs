//! Speaker output for synthesized narration
//!
//! The controller speaks questions, acknowledgments, and analysis back to
//! the user. Playback is synchronous (it blocks until the clip finishes)
//! and is always run on a blocking task so the event loop keeps ticking.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, Sink};

/// Errors from audio playback
#[derive(Debug, Clone)]
pub enum PlaybackError {
    /// No output device, or it refused our config
    DeviceUnavailable(String),
    /// The audio bytes could not be decoded (bad MP3/WAV)
    DecodeFailed(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::DeviceUnavailable(e) => {
                write!(f, "Audio output unavailable: {}", e)
            }
            PlaybackError::DecodeFailed(e) => write!(f, "Failed to decode audio: {}", e),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Plays a clip of encoded audio (MP3/WAV) to completion.
pub trait Playback: Send + Sync {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError>;
}

/// Speaker playback via rodio.
///
/// The output stream is opened per clip: rodio's stream handle is not
/// Send, and clips are seconds apart, so reopening is the simpler trade.
#[derive(Debug, Default)]
pub struct RodioPlayback;

impl Playback for RodioPlayback {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        if audio.is_empty() {
            return Ok(());
        }

        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        let source = Decoder::new(Cursor::new(audio.to_vec()))
            .map_err(|e| PlaybackError::DecodeFailed(e.to_string()))?;

        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }
}

/// Discards audio. Used headless and in tests.
#[derive(Debug, Default)]
pub struct NullPlayback;

impl Playback for NullPlayback {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        log::debug!("Playback (null): discarding {} bytes", audio.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_playback_accepts_anything() {
        let playback = NullPlayback;
        assert!(playback.play(&[]).is_ok());
        assert!(playback.play(&[0u8; 128]).is_ok());
    }

    #[test]
    fn test_rodio_empty_clip_is_noop() {
        // Empty clip short-circuits before touching the device, so this
        // passes even on machines with no audio output.
        let playback = RodioPlayback;
        assert!(playback.play(&[]).is_ok());
    }

    #[test]
    fn test_playback_error_display() {
        let err = PlaybackError::DecodeFailed("not an mp3".to_string());
        assert!(err.to_string().contains("not an mp3"));
    }
}
