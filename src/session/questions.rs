//! The fixed interview question sequence and spoken narratives
//!
//! Questions progress from easy openers to deeper reflection. The list is
//! immutable; sessions reference questions by ordinal index. When a store
//! is configured the same prompts exist as rows in the `questions` table,
//! matched by prompt text.

use serde::{Deserialize, Serialize};

/// Question category, ordered roughly by emotional depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Opening,
    LightMemory,
    Connection,
    Deepening,
    Reflective,
}

/// One question in the interview sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Stable slug, matches the seed data in the store
    pub id: &'static str,
    pub prompt: &'static str,
    pub category: QuestionCategory,
}

/// Index of the identity-capture question. Its answer becomes the user's
/// display name and skips the analysis endpoint entirely.
pub const IDENTITY_QUESTION_INDEX: usize = 0;

pub const QUESTION_SEQUENCE: &[Question] = &[
    // Opening, comfort questions
    Question {
        id: "name-preference",
        prompt: "What name would you like to go by today?",
        category: QuestionCategory::Opening,
    },
    Question {
        id: "current-feeling",
        prompt: "How are you feeling right now?",
        category: QuestionCategory::Opening,
    },
    // Light memory activation
    Question {
        id: "childhood-place",
        prompt: "Can you tell me about where you grew up?",
        category: QuestionCategory::LightMemory,
    },
    Question {
        id: "favorite-food",
        prompt: "What's one favorite food or dish from your childhood?",
        category: QuestionCategory::LightMemory,
    },
    Question {
        id: "memorable-song",
        prompt: "Do you have a song that always brings back memories?",
        category: QuestionCategory::LightMemory,
    },
    // Building connection
    Question {
        id: "important-people",
        prompt: "Who has been important in your life\u{2014}family, friends, mentors?",
        category: QuestionCategory::Connection,
    },
    Question {
        id: "typical-day",
        prompt: "What was a typical day like for you when you were young?",
        category: QuestionCategory::Connection,
    },
    Question {
        id: "pets-companions",
        prompt: "Do you have any pets or companion animals in your story?",
        category: QuestionCategory::Connection,
    },
    // Gentle deepening
    Question {
        id: "smile-moment",
        prompt: "What's a moment from your life that makes you smile when you think of it?",
        category: QuestionCategory::Deepening,
    },
    Question {
        id: "wisdom-lesson",
        prompt: "What is one lesson or piece of wisdom you'd like your family to remember?",
        category: QuestionCategory::Deepening,
    },
    Question {
        id: "overcoming-challenge",
        prompt: "Can you share a story about a challenge you faced, and how you overcame it?",
        category: QuestionCategory::Deepening,
    },
    // Reflective / identity prompts
    Question {
        id: "proudest-moment",
        prompt: "What are you most proud of in your life?",
        category: QuestionCategory::Reflective,
    },
    Question {
        id: "family-tradition",
        prompt: "Is there a tradition or value from your family you hope will continue?",
        category: QuestionCategory::Reflective,
    },
    Question {
        id: "message-to-youth",
        prompt: "What message would you give to younger generations about living well?",
        category: QuestionCategory::Reflective,
    },
];

/// Spoken narrative lines. Fixed text so the backend TTS cache can serve
/// them without re-synthesis.
pub mod narratives {
    pub const INTRO: &str = "Welcome! You're about to begin a conversation that puts your memories and experiences at the heart of it all. Here's how it works: when you're ready, start recording and speak your response out loud. There's no need to worry about saying the right thing. Share whatever comes to mind, big or small, at your own pace. You can say as much or as little as you'd like. Your story is yours to tell, and there's no wrong way to begin. Ready? Let's take the first step together.";

    pub const OUTRO: &str = "Thank you for sharing your stories and memories today. Every conversation is a step toward keeping your mind active, your heart connected, and your legacy alive. Remember, your experiences and wisdom matter, not just to family, but to the world. Whenever you wish to continue, reflect, or simply talk, this space is here for you. Until next time, take care of yourself and know that your story continues to inspire.";

    pub const ERROR: &str = "I apologize, but something went wrong. Please try again, or move on to the next question. If the problem continues, please let us know so we can help.";

    pub const NO_SPEECH: &str = "I didn't catch anything that time. When you're ready, try recording your answer again.";
}

/// Extract a display name from the answer to the identity question.
///
/// Handles the common phrasings ("My name is Alex", "I'm Alex", "call me
/// Alex", or just "Alex"). Returns the remainder after the last
/// recognized lead-in, trimmed of punctuation.
pub fn extract_display_name(answer: &str) -> Option<String> {
    let cleaned = answer.trim();
    if cleaned.is_empty() {
        return None;
    }

    let lower = cleaned.to_lowercase();
    let lead_ins = [
        "my name is ",
        "you can call me ",
        "call me ",
        "i go by ",
        "i am ",
        "i'm ",
        "it's ",
        "this is ",
    ];

    let start = lead_ins
        .iter()
        .filter_map(|p| lower.rfind(p).map(|i| i + p.len()))
        .max()
        .unwrap_or(0);

    // Byte offsets into the lowercased copy only line up for ASCII; fall
    // back to the whole answer otherwise
    let name = cleaned
        .get(start..)
        .unwrap_or(cleaned)
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Templated spoken acknowledgment for the identity question. Generated
/// locally; the identity answer never goes through analysis.
pub fn identity_acknowledgment(name: &str) -> String {
    format!(
        "It's lovely to meet you, {}. Thank you for being here today. Let's continue.",
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_shape() {
        assert_eq!(QUESTION_SEQUENCE.len(), 14);
        assert_eq!(
            QUESTION_SEQUENCE[IDENTITY_QUESTION_INDEX].id,
            "name-preference"
        );
        // Slugs are unique
        let mut ids: Vec<_> = QUESTION_SEQUENCE.iter().map(|q| q.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), QUESTION_SEQUENCE.len());
    }

    #[test]
    fn test_prompts_match_store_seed_text() {
        // Answers are persisted by exact-prompt lookup against the rows
        // seeded in the store, so the text must match byte for byte,
        // punctuation included.
        assert_eq!(
            QUESTION_SEQUENCE[5].prompt,
            "Who has been important in your life\u{2014}family, friends, mentors?"
        );
        assert_eq!(
            QUESTION_SEQUENCE[3].prompt,
            "What's one favorite food or dish from your childhood?"
        );
    }

    #[test]
    fn test_extract_name_with_lead_in() {
        assert_eq!(
            extract_display_name("My name is Alex").as_deref(),
            Some("Alex")
        );
        assert_eq!(
            extract_display_name("Well, I'm Margaret.").as_deref(),
            Some("Margaret")
        );
        assert_eq!(
            extract_display_name("You can call me Bob").as_deref(),
            Some("Bob")
        );
    }

    #[test]
    fn test_extract_name_bare() {
        assert_eq!(extract_display_name("Alex").as_deref(), Some("Alex"));
        assert_eq!(extract_display_name("  Rosa  ").as_deref(), Some("Rosa"));
    }

    #[test]
    fn test_extract_name_uses_last_lead_in() {
        // "I'm fine, my name is Sam" should pick up Sam, not "fine, my name is Sam"
        assert_eq!(
            extract_display_name("I'm fine, my name is Sam").as_deref(),
            Some("Sam")
        );
    }

    #[test]
    fn test_extract_name_empty() {
        assert_eq!(extract_display_name(""), None);
        assert_eq!(extract_display_name("   "), None);
        assert_eq!(extract_display_name("My name is "), None);
    }

    #[test]
    fn test_identity_acknowledgment_mentions_name() {
        let ack = identity_acknowledgment("Alex");
        assert!(ack.contains("Alex"));
    }
}
