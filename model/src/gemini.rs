use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use figure_judge_common::config::ModelConfig;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{Completion, JudgeModel, ModelError, Part};

/// Gemini `generateContent` over REST.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key,
        })
    }

    /// Build a client from the key in `config.api_key_env`.
    ///
    /// Returns `None` when the key is missing or the client cannot be built;
    /// judging then reports the model as unavailable instead of failing startup.
    pub fn from_env(config: &ModelConfig) -> Option<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(var = %config.api_key_env, "API key not set; judging is disabled");
                return None;
            }
        };
        match Self::new(config, api_key) {
            Ok(client) => {
                info!(model = %config.name, "model client initialized");
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "failed to initialize model client; judging is disabled");
                None
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn call(&self, parts: Vec<Part>, max_output_tokens: u32) -> Result<Completion, ModelError> {
        let body = GenerateRequest::new(parts, max_output_tokens);
        debug!(model = %self.model, parts = body.contents[0].parts.len(), "calling generateContent");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: api_error_message(&bytes),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(parsed.into_completion())
    }
}

impl JudgeModel for GeminiClient {
    fn generate<'a>(
        &'a self,
        parts: Vec<Part>,
        max_output_tokens: u32,
    ) -> BoxFuture<'a, Result<Completion, ModelError>> {
        Box::pin(self.call(parts, max_output_tokens))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

impl GenerateRequest {
    fn new(parts: Vec<Part>, max_output_tokens: u32) -> Self {
        let parts = parts
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::Text { text },
                Part::Jpeg(bytes) => WirePart::Inline {
                    inline_data: InlineData {
                        mime_type: "image/jpeg",
                        data: STANDARD.encode(bytes),
                    },
                },
            })
            .collect();
        Self {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig { max_output_tokens },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate; a prompt-level block reason stands in
    /// for the finish reason when there are no candidates.
    fn into_completion(self) -> Completion {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        match self.candidates.into_iter().next() {
            Some(candidate) => Completion {
                text: candidate
                    .content
                    .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                    .unwrap_or_default(),
                finish_reason: candidate.finish_reason.or(block_reason),
            },
            None => Completion {
                text: String::new(),
                finish_reason: block_reason,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn api_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest::new(
            vec![Part::Text("judge this".into()), Part::Jpeg(vec![0xFF, 0xD8, 0xFF])],
            8000,
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8000);
        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "judge this");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "/9j/");
    }

    #[test]
    fn completion_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{
                "content": {"role": "model", "parts": [{"text": "Score: "}, {"text": "6.5"}]},
                "finishReason": "STOP"
            }]}"#,
        )
        .unwrap();
        let completion = response.into_completion();
        assert_eq!(completion.text, "Score: 6.5");
        assert_eq!(completion.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn safety_block_without_content() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        let completion = response.into_completion();
        assert!(completion.text.is_empty());
        assert_eq!(completion.finish_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn prompt_block_without_candidates() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_completion().finish_reason.as_deref(),
            Some("SAFETY")
        );
    }

    #[test]
    fn api_error_messages() {
        assert_eq!(
            api_error_message(br#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#),
            "API key not valid"
        );
        assert_eq!(api_error_message(b"Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let config = ModelConfig {
            api_base: "https://example.test/v1beta/".into(),
            ..ModelConfig::default()
        };
        let client = GeminiClient::new(&config, "k".into()).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
