//! Transcript aggregation for real-time streaming
//!
//! Collects turn-level transcript events into the answer text shown live
//! and submitted for analysis when recording stops.
//!
//! # Aggregation Strategy
//!
//! - **Interim turns**: replace the pending interim text (the service
//!   resends the whole turn so far, not a delta)
//! - **Final turns**: appended to the accumulated transcript; any pending
//!   interim display state is cleared
//!
//! Interim events for a turn always precede that turn's final event, so a
//! final turn makes every interim for it obsolete.

use super::protocol::TranscriptEvent;

/// Aggregates turn transcripts into the best-known answer text
#[derive(Debug, Clone, Default)]
pub struct TranscriptAggregator {
    /// Completed turns joined with single spaces
    final_text: String,
    /// Transcript-in-progress for the current turn
    interim_text: String,
    /// Count of final turns absorbed
    turn_count: u64,
}

impl TranscriptAggregator {
    /// Create a new empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a transcript event.
    ///
    /// Returns the current best-known full text after the update.
    pub fn process(&mut self, event: &TranscriptEvent) -> String {
        if event.is_final {
            if !event.text.is_empty() {
                if !self.final_text.is_empty() {
                    self.final_text.push(' ');
                }
                self.final_text.push_str(&event.text);
                self.turn_count += 1;
            }
            // A final turn supersedes every interim for it
            self.interim_text.clear();
        } else {
            self.interim_text = event.text.clone();
        }
        self.current_text()
    }

    /// The transcript submitted for analysis: completed turns only.
    ///
    /// Interim text is display-only; at stop time anything still interim is
    /// treated as superseded.
    pub fn transcript(&self) -> &str {
        &self.final_text
    }

    /// Best-known full text for live display (final turns + pending interim)
    pub fn current_text(&self) -> String {
        if self.interim_text.is_empty() {
            self.final_text.clone()
        } else if self.final_text.is_empty() {
            self.interim_text.clone()
        } else {
            format!("{} {}", self.final_text, self.interim_text)
        }
    }

    /// Pending interim text for the current turn, if any
    pub fn interim_text(&self) -> &str {
        &self.interim_text
    }

    pub fn has_text(&self) -> bool {
        !self.final_text.is_empty() || !self.interim_text.is_empty()
    }

    /// Count of completed turns
    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    /// Reset for a new recording attempt
    pub fn reset(&mut self) {
        self.final_text.clear();
        self.interim_text.clear();
        self.turn_count = 0;
    }
}
