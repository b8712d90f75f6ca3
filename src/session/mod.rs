//! Guided interview session: question sequence, state machine, and the
//! controller that runs effects against the audio and backend layers.

pub mod controller;
pub mod questions;
pub mod state;
pub mod strategy;

pub use controller::{ResponseRecord, SessionController, SessionSummary};
pub use questions::{Question, QuestionCategory, IDENTITY_QUESTION_INDEX, QUESTION_SEQUENCE};
pub use state::{reduce, Effect, Event, State, MAX_RECORDING_DURATION};
pub use strategy::{
    BatchStrategy, FinishedAttempt, StrategyPolicy, StreamingStrategy, TranscribeError,
    TranscriptionMode, TranscriptionStrategy,
};
