//! Answer Service
//!
//! [`AnswerService`] is the seam between the chat session and the language
//! model provider. Each call is independent: no retry, no streaming, no
//! caching. The credential is passed per call and never stored here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::Credential;
use crate::prompt::{AnswerRequest, PromptPart};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Answer {
    pub answer: String,
}

#[derive(Error, Debug)]
pub enum AnswerError {
    /// Non-success status; carries the provider's own message.
    #[error("{0}")]
    Provider(String),
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(
        &self,
        request: &AnswerRequest,
        credential: &Credential,
    ) -> Result<Answer, AnswerError>;
}

// Gemini generateContent wire types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_json_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_body(request: &AnswerRequest) -> GeminiRequest {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text { text } => GeminiPart {
                    text: Some(text.clone()),
                    ..Default::default()
                },
                PromptPart::Media { media_type, data } => GeminiPart {
                    inline_data: Some(InlineData {
                        mime_type: media_type.clone(),
                        data: data.clone(),
                    }),
                    ..Default::default()
                },
            })
            .collect();

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_json_schema: request.output_schema.clone(),
            },
        }
    }
}

/// Pull `{"answer": ...}` out of the first candidate's text.
fn parse_answer(body: &str) -> Result<Answer, AnswerError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| AnswerError::MalformedResponse(format!("invalid response body: {}", e)))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnswerError::MalformedResponse(
            "no candidate text in response".to_string(),
        ));
    }

    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| AnswerError::MalformedResponse(format!("answer is not JSON: {}", e)))?;

    value
        .get("answer")
        .and_then(|a| a.as_str())
        .map(|answer| Answer {
            answer: answer.to_string(),
        })
        .ok_or_else(|| AnswerError::MalformedResponse("missing `answer` field".to_string()))
}

fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => format!("provider returned status {}", status),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl AnswerService for GeminiClient {
    async fn answer(
        &self,
        request: &AnswerRequest,
        credential: &Credential,
    ) -> Result<Answer, AnswerError> {
        let body = Self::build_body(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = provider_message(status, &text);
            tracing::warn!(%status, model = %self.model, "provider rejected request");
            return Err(AnswerError::Provider(message));
        }

        parse_answer(&text)
    }
}
