use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row in the `sessions` table
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Row in the `questions` table (active questions only)
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRow {
    pub id: Uuid,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub(super) struct NewSession<'a> {
    pub user_id: Uuid,
    pub channel: &'a str,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct NewAnswer<'a> {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct NewTranscript<'a> {
    pub session_id: Uuid,
    pub text: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionEnd {
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProfileName<'a> {
    pub user_id: Uuid,
    pub display_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_row_deserializes() {
        let row: QuestionRow = serde_json::from_str(
            r#"{"id": "6f4a1c52-8d2e-4b3a-9c1d-2e5f7a8b9c0d", "prompt": "What's your name?"}"#,
        )
        .unwrap();
        assert_eq!(row.prompt, "What's your name?");
    }

    #[test]
    fn test_session_row_without_end_time() {
        let row: SessionRow = serde_json::from_str(
            r#"{
                "id": "6f4a1c52-8d2e-4b3a-9c1d-2e5f7a8b9c0d",
                "user_id": "11111111-2222-3333-4444-555555555555",
                "channel": "voice",
                "started_at": "2026-08-30T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(row.channel, "voice");
        assert!(row.ended_at.is_none());
    }
}
