use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use super::types::{
    NewAnswer, NewSession, NewTranscript, ProfileName, QuestionRow, SessionEnd, SessionRow,
};
use super::StoreError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Supabase project backing the interview.
///
/// Speaks PostgREST for tables and the functions gateway for edge
/// functions. Guest identity only, so the anon key doubles as the bearer
/// token.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    /// Build a client from `SUPABASE_URL` / `SUPABASE_ANON_KEY`, or `None`
    /// when either is unset. The interview runs fine without persistence.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SUPABASE_URL").ok().filter(|s| !s.is_empty())?;
        let key = std::env::var("SUPABASE_ANON_KEY")
            .ok()
            .filter(|s| !s.is_empty())?;
        Some(Self::new(url, key))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    /// Create a new voice session row, returning its id.
    pub async fn create_session(&self, user_id: Uuid) -> Result<Uuid, StoreError> {
        let body = NewSession {
            user_id,
            channel: "voice",
            started_at: Utc::now(),
        };

        let response = self
            .authed(self.client.post(self.table_url("sessions")))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        let rows: Vec<SessionRow> = Self::parse_json(response).await?;
        let session = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::ParseError("insert returned no rows".to_string()))?;

        log::info!("Session created: {}", session.id);
        Ok(session.id)
    }

    /// Load the active question bank, ordered by sort index.
    ///
    /// Used to map prompt text to question ids when saving answers.
    pub async fn load_questions(&self) -> Result<Vec<QuestionRow>, StoreError> {
        let response = self
            .authed(self.client.get(self.table_url("questions")))
            .query(&[
                ("select", "id,prompt"),
                ("is_active", "eq.true"),
                ("order", "sort_index.asc"),
            ])
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        Self::parse_json(response).await
    }

    /// Save an answer and its transcript row.
    ///
    /// Two inserts; a transcript failure after a successful answer insert
    /// is logged and swallowed, since the answer row is the one that
    /// matters downstream.
    pub async fn save_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        answer_text: &str,
    ) -> Result<(), StoreError> {
        let answer = NewAnswer {
            session_id,
            question_id,
            answer_text,
        };

        let response = self
            .authed(self.client.post(self.table_url("answers")))
            .json(&answer)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;
        Self::check_status(response).await?;

        let transcript = NewTranscript {
            session_id,
            text: answer_text,
            language: "en",
        };

        let response = self
            .authed(self.client.post(self.table_url("transcripts")))
            .json(&transcript)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;
        if let Err(e) = Self::check_status(response).await {
            log::warn!("Transcript insert failed (answer saved): {}", e);
        }

        Ok(())
    }

    /// Mark the session ended. Called exactly once, at finalization.
    pub async fn end_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.patch(self.table_url("sessions")))
            .query(&[("id", format!("eq.{}", session_id))])
            .json(&SessionEnd {
                ended_at: Utc::now(),
            })
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        Self::check_status(response).await
    }

    /// Record the display name captured by the identity question.
    pub async fn save_display_name(&self, user_id: Uuid, name: &str) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(self.table_url("profiles")))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&ProfileName {
                user_id,
                display_name: name,
            })
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        Self::check_status(response).await
    }

    /// Kick off server-side NLP extraction for a saved answer.
    pub async fn extract_nlp_data(
        &self,
        session_id: Uuid,
        transcript: &str,
        analysis: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(self.function_url("extract-nlp-data")))
            .json(&json!({
                "session_id": session_id,
                "transcript": transcript,
                "analysis": analysis,
            }))
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        Self::check_status(response).await
    }

    /// Recompute the user's profile from all their session data.
    pub async fn recompute_profile(&self, user_id: Uuid) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(self.function_url("recompute-profile")))
            .json(&json!({ "user_id": user_id }))
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        Self::check_status(response).await
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| StoreError::ParseError(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Backend {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Backend {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let store = StoreClient::new("https://abc.supabase.co/", "key");
        assert_eq!(
            store.table_url("sessions"),
            "https://abc.supabase.co/rest/v1/sessions"
        );
        assert_eq!(
            store.function_url("recompute-profile"),
            "https://abc.supabase.co/functions/v1/recompute-profile"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_error() {
        let store = StoreClient::new("http://127.0.0.1:1", "key");
        let err = store.create_session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NetworkError(_)));
    }
}
