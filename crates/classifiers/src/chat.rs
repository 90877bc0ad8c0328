//! Chat-completion strategies: local inference server and remote LLM API.
//!
//! Both talk to an OpenAI-compatible `/chat/completions` endpoint. Works with
//! Ollama, llama.cpp, vLLM for the local strategy and OpenAI, OpenRouter or
//! any compatible service for the remote one. The model is asked for a small
//! JSON object; anything unparseable or uncertain is a decline.

use async_trait::async_trait;
use dropsort_config::{LocalModelConfig, RemoteApiConfig};
use dropsort_core::classify::{Answer, Asset, AssetType, ClassificationMethod, Confidence, Strategy};
use dropsort_core::error::StrategyError;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You sort downloaded media assets for video editors. \
Given a file name and where it came from, reply with one JSON object only: \
{\"asset_type\": one of music, sound_effect, footage, image, template, document, unknown; \
\"confidence\": one of low, medium, high; \
\"tags\": up to five short mood or genre labels; \
\"rationale\": one short sentence}.";

/// An OpenAI-compatible chat strategy.
pub struct ChatStrategy {
    method: ClassificationMethod,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl ChatStrategy {
    pub fn new(
        method: ClassificationMethod,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            method,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
        }
    }

    /// Local inference server (Ollama by default). No key needed.
    pub fn local(config: &LocalModelConfig) -> Self {
        Self::new(
            ClassificationMethod::LocalModel,
            &config.api_url,
            None,
            &config.model,
        )
    }

    /// Remote LLM API.
    pub fn remote(config: &RemoteApiConfig) -> Self {
        Self::new(
            ClassificationMethod::RemoteLlm,
            &config.api_url,
            config.api_key.clone(),
            &config.model,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn user_prompt(asset: &Asset) -> String {
        let mut prompt = format!("File name: {}", asset.file_name());
        let parents = asset.parent_names();
        if !parents.is_empty() {
            prompt.push_str(&format!("\nFolders (nearest first): {}", parents.join(" / ")));
        }
        if let Some(folder) = &asset.source_folder {
            prompt.push_str(&format!("\nArchive: {folder}"));
        }
        if let Some(origin) = &asset.origin_hint {
            prompt.push_str(&format!("\nDownloaded from: {origin}"));
        }
        prompt
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    async fn complete(&self, asset: &Asset) -> Result<Answer, StrategyError> {
        if self.method == ClassificationMethod::RemoteLlm && self.api_key.is_none() {
            return Err(StrategyError::NotConfigured("remote API key missing".into()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(asset) },
            ],
            "temperature": 0.0,
            "response_format": { "type": "json_object" },
            "stream": false,
        });

        debug!(method = %self.method, model = %self.model, asset = %asset.file_name(), "Sending classification request");

        let response = self
            .request(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| StrategyError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(StrategyError::RateLimited { retry_after_secs });
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(method = %self.method, status, body = %error_body, "Classifier endpoint returned error");
            return Err(StrategyError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| StrategyError::Api {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StrategyError::Ambiguous("empty completion".into()))?;

        parse_answer(&content)
    }
}

#[async_trait]
impl Strategy for ChatStrategy {
    fn method(&self) -> ClassificationMethod {
        self.method
    }

    async fn attempt(
        &self,
        asset: &Asset,
        cancel: CancellationToken,
    ) -> Result<Answer, StrategyError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StrategyError::Cancelled),
            r = self.complete(asset) => r,
        }
    }

    async fn health_check(&self) -> Result<bool, StrategyError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StrategyError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Interpret the model's reply. Tolerates prose or code fences around the
/// JSON object.
pub fn parse_answer(content: &str) -> Result<Answer, StrategyError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => return Err(StrategyError::Ambiguous("no JSON object in reply".into())),
    };

    let raw: RawAnswer = serde_json::from_str(json)
        .map_err(|e| StrategyError::Ambiguous(format!("malformed reply: {e}")))?;

    let asset_type = AssetType::from_label(&raw.asset_type)
        .ok_or_else(|| StrategyError::Ambiguous(format!("unknown type '{}'", raw.asset_type)))?;
    if asset_type == AssetType::Unknown {
        return Err(StrategyError::Ambiguous("model could not tell".into()));
    }

    let confidence: Confidence = raw
        .confidence
        .parse()
        .map_err(StrategyError::Ambiguous)?;

    let tags = raw
        .tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .take(5)
        .collect();

    let mut answer = Answer::new(asset_type, confidence).with_tags(tags);
    if let Some(r) = raw.rationale.filter(|r| !r.trim().is_empty()) {
        answer = answer.with_rationale(r);
    }
    Ok(answer)
}

// --- API types ---

#[derive(Debug, Deserialize)]
struct RawAnswer {
    asset_type: String,
    confidence: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}
