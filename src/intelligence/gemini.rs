//! REST client for the Gemini `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::prompts::ResponseSchema;
use super::{GenerationError, TextGenerator};
use crate::types::Config;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Build from config. `None` when no API key is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.ai_configured() {
            return None;
        }
        let key = config.gemini_api_key.as_deref()?;
        let mut client = Self::new(key.trim(), &config.gemini_model);
        match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
        {
            Ok(http) => client.client = http,
            Err(e) => log::warn!("Falling back to default HTTP client: {e}"),
        }
        Some(client)
    }

    /// Point at a different host (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

fn request_body(prompt: &str, schema: Option<ResponseSchema>) -> serde_json::Value {
    let mut body = json!({
        "contents": [{ "parts": [{ "text": prompt }] }]
    });
    if let Some(schema) = schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema.to_json(),
        });
    }
    body
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenated text of the first candidate.
fn first_candidate_text(resp: GenerateResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<ResponseSchema>,
    ) -> Result<String, GenerationError> {
        log::debug!("Gemini request to {} ({} chars)", self.model, prompt.len());
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body(prompt, schema))
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Parse(format!("Gemini response: {e}")))?;
        first_candidate_text(parsed).ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::new("k", "gemini-3-flash-preview")
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_body_without_schema_is_plain_text() {
        let body = request_body("hello", None);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_body_with_schema_requests_json() {
        let body = request_body("hello", Some(ResponseSchema::TaskList));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn test_first_candidate_text_joins_parts() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(first_candidate_text(resp).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_no_candidates_is_none() {
        let resp: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(first_candidate_text(resp).is_none());
    }

    #[test]
    fn test_from_config_needs_key() {
        let mut config = Config::default();
        assert!(GeminiClient::from_config(&config).is_none());
        config.gemini_api_key = Some("  ".to_string());
        assert!(GeminiClient::from_config(&config).is_none());
        config.gemini_api_key = Some("abc".to_string());
        assert!(GeminiClient::from_config(&config).is_some());
    }
}
