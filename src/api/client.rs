use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiError;

pub const DEFAULT_API_BASE_URL: &str = "https://life-review-api.fly.dev/api";

/// Request timeout. Analysis calls hit an LLM and TTS synthesis on the
/// backend, so this is generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// TTS voice selection, forwarded verbatim to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Nova
    }
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alloy" => Some(Voice::Alloy),
            "echo" => Some(Voice::Echo),
            "fable" => Some(Voice::Fable),
            "onyx" => Some(Voice::Onyx),
            "nova" => Some(Voice::Nova),
            "shimmer" => Some(Voice::Shimmer),
            _ => None,
        }
    }
}

/// TTS cache bucket. The backend caches narratives and questions
/// aggressively; greetings and outros are templated per user and cached
/// less so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Narrative,
    Question,
    Greeting,
    Outro,
}

/// Analysis result, optionally carrying a pre-rendered TTS path
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: String,
    #[serde(default)]
    pub tts_path: Option<String>,
}

/// One question/answer pair in a whole-session analysis request
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ExtractQuestionsResponse {
    questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Client for the interview backend API.
///
/// Construct one and pass it by reference; it holds a connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Check backend liveness. Any error maps to `false`.
    pub async fn health(&self) -> bool {
        match self.client.get(self.url("health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Extract interview questions from a PDF document.
    pub async fn extract_questions(&self, pdf_path: &Path) -> Result<Vec<String>, ApiError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| ApiError::NetworkError(format!("read {:?}: {}", pdf_path, e)))?;

        let filename = pdf_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("questions.pdf")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(|e| ApiError::ParseError(e.to_string()))?;

        let form = Form::new().part("pdf", part);

        let response = self
            .client
            .post(self.url("extract-questions"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let parsed: ExtractQuestionsResponse = Self::parse_json(response).await?;
        Ok(parsed.questions)
    }

    /// Synthesize speech for `text`. Returns the raw audio bytes (MP3).
    pub async fn text_to_speech(
        &self,
        text: &str,
        voice: Voice,
        content_type: ContentType,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .post(self.url("text-to-speech"))
            .json(&json!({
                "text": text,
                "voice": voice,
                "content_type": content_type,
            }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::NetworkError(e.to_string()))?;
            log::debug!("TTS: {} chars -> {} bytes", text.len(), bytes.len());
            Ok(bytes.to_vec())
        } else {
            Err(Self::backend_error(status.as_u16(), response).await)
        }
    }

    /// Transcribe a recorded WAV clip (batch fallback path).
    pub async fn transcribe(&self, wav_path: &Path) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(wav_path)
            .await
            .map_err(|e| ApiError::NetworkError(format!("read {:?}: {}", wav_path, e)))?;

        let filename = wav_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recording.wav")
            .to_string();

        log::info!("Batch transcribing: {} ({} bytes)", filename, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("audio/wav")
            .map_err(|e| ApiError::ParseError(e.to_string()))?;

        let form = Form::new().part("audio", part);

        let response = self
            .client
            .post(self.url("transcribe"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let parsed: TranscribeResponse = Self::parse_json(response).await?;
        Ok(parsed.transcript)
    }

    /// Analyze an answer (no TTS).
    pub async fn analyze(&self, question: &str, answer: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("analyze"))
            .json(&json!({ "question": question, "answer": answer }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let parsed: AnalysisResponse = Self::parse_json(response).await?;
        Ok(parsed.analysis)
    }

    /// Analyze an answer and synthesize the spoken acknowledgment in one
    /// round trip.
    pub async fn analyze_and_tts(
        &self,
        question: &str,
        answer: &str,
        voice: Voice,
    ) -> Result<AnalysisResponse, ApiError> {
        let response = self
            .client
            .post(self.url("analyze-and-tts"))
            .json(&json!({ "question": question, "answer": answer, "voice": voice }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Self::parse_json(response).await
    }

    /// Analyze a follow-up answer with the original exchange as context.
    pub async fn analyze_followup(
        &self,
        original_question: &str,
        original_answer: &str,
        followup_answer: &str,
        voice: Voice,
    ) -> Result<AnalysisResponse, ApiError> {
        let response = self
            .client
            .post(self.url("analyze-followup"))
            .json(&json!({
                "original_question": original_question,
                "original_answer": original_answer,
                "followup_answer": followup_answer,
                "voice": voice,
            }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Self::parse_json(response).await
    }

    /// Analyze the complete session transcript. Returns the raw JSON
    /// analysis; callers persist it rather than interpret it.
    pub async fn analyze_session(
        &self,
        session_data: &[SessionEntry],
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .post(self.url("analyze-session"))
            .json(&json!({ "session_data": session_data }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Self::parse_json(response).await
    }

    /// Warm the backend TTS cache with the fixed narrative lines.
    pub async fn pre_cache_narratives(&self, voice: Voice) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("pre-cache-narratives"))
            .json(&json!({ "voice": voice }))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::backend_error(status.as_u16(), response).await)
        }
    }

    /// TTS cache statistics, for diagnostics.
    pub async fn cache_stats(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(self.url("cache-stats"))
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Self::parse_json(response).await
    }

    /// Fetch a pre-rendered audio artifact by the path the backend
    /// returned (e.g. from `analyze-and-tts`).
    pub async fn fetch_audio(&self, tts_path: &str) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}/{}", self.base_url, tts_path.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::NetworkError(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            Err(Self::backend_error(status.as_u16(), response).await)
        }
    }

    /// Mint a short-lived streaming token so the long-lived key never
    /// leaves the backend.
    pub async fn assemblyai_token(&self, expires_in_seconds: u32) -> Result<String, ApiError> {
        let response = self
            .client
            .get(self.url("assemblyai-token"))
            .query(&[("expires_in_seconds", expires_in_seconds)])
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let parsed: TokenResponse = Self::parse_json(response).await?;
        Ok(parsed.token)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ApiError::ParseError(e.to_string()))
        } else {
            Err(Self::backend_error(status.as_u16(), response).await)
        }
    }

    async fn backend_error(status: u16, response: reqwest::Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => err.error,
            Err(_) => body,
        };
        log::error!("Backend error ({}): {}", status, message);
        ApiError::Backend { status, message }
    }
}
