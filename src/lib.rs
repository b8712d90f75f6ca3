//! Life Review: a guided voice interview for capturing life stories
//!
//! The crate wires four layers together:
//!
//! - [`audio`]: microphone capture producing 16 kHz PCM frames and a WAV
//!   clip per recording attempt
//! - [`streaming`]: real-time transcription over a WebSocket, with the
//!   WAV clip as the batch fallback
//! - [`api`] and [`store`]: the analysis/TTS backend and the persistence
//!   layer, both best effort from the interview's point of view
//! - [`session`]: the interview state machine and its controller
//!
//! The binary in `main.rs` drives a [`session::SessionController`] from
//! stdin commands; the library is usable headless from tests or other
//! front ends.

pub mod api;
pub mod audio;
pub mod guest;
pub mod playback;
pub mod session;
pub mod settings;
pub mod store;
pub mod streaming;

pub use session::{Event, SessionController, SessionSummary, State};
