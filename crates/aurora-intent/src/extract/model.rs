//! Model-backed extraction.

use anyhow::Context;
use async_trait::async_trait;
use aurora_core::{ModelApi, ModelProviderConfig, RawFields};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;

use super::Extractor;
use crate::error::ExtractError;

const SYSTEM_PROMPT: &str = "You extract network service requests into JSON. Reply with a \
single JSON object and nothing else. Keys: service_type (L3VPN, EVPN, QoS, Security or \
Routing, omit if not stated), service_markers (keywords such as l3vpn, evpn, evpn-l2, evpn-l3, \
evpn-irb, qos, security, routing), service_id (only if the text names one), devices (device \
names in order of appearance), interfaces (interface names in the same order as devices), \
transit_devices (devices only passed through), params (object mapping parameter names such as \
vrf, rd, rt, as, vni, mtu, vlan, bandwidth_mbps, latency_ms, jitter_ms, loss_pct, dscp, acl, \
protocol, bfd, auth to arrays of every value mentioned). Never invent values.";

/// A chat-style language model client.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's text reply to a system and user message.
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// JSON schema a model reply must satisfy before it is accepted as raw fields.
pub fn raw_fields_schema() -> Value {
    let strings = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "service_type": { "type": ["string", "null"] },
            "service_markers": strings,
            "service_id": { "type": ["string", "null"] },
            "devices": strings,
            "interfaces": strings,
            "transit_devices": strings,
            "params": {
                "type": "object",
                "additionalProperties": {
                    "type": "array",
                    "items": { "type": ["string", "number", "boolean"] }
                }
            }
        },
        "additionalProperties": false
    })
}

/// Extractor that delegates to a language model and validates its reply.
pub struct ModelBackedExtractor {
    model: Arc<dyn LanguageModel>,
    validator: jsonschema::Validator,
}

impl ModelBackedExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Result<Self, ExtractError> {
        let validator = jsonschema::validator_for(&raw_fields_schema())
            .map_err(|e| ExtractError::Config(format!("raw fields schema: {}", e)))?;
        Ok(Self { model, validator })
    }

    fn parse_reply(&self, reply: &str) -> Result<RawFields, ExtractError> {
        // Models like to wrap JSON in prose or code fences
        let start = reply.find('{');
        let end = reply.rfind('}');
        let body = match (start, end) {
            (Some(s), Some(e)) if s < e => &reply[s..=e],
            _ => return Err(ExtractError::InvalidReply(truncate(reply))),
        };
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ExtractError::InvalidReply(format!("{}: {}", e, truncate(body))))?;

        if !self.validator.is_valid(&value) {
            let errors = self
                .validator
                .iter_errors(&value)
                .take(10)
                .map(|e| {
                    let path = e.instance_path().to_string();
                    let location = if path.is_empty() { "(root)".to_string() } else { path };
                    format!("{}: {}", location, e)
                })
                .collect();
            return Err(ExtractError::SchemaViolation(errors));
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(120).collect()
}

#[async_trait]
impl Extractor for ModelBackedExtractor {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn extract(&self, text: &str) -> Result<RawFields, ExtractError> {
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyInput);
        }
        let reply = self
            .model
            .complete(SYSTEM_PROMPT, text)
            .await
            .map_err(ExtractError::Model)?;
        let raw = self.parse_reply(&reply)?;
        tracing::debug!(devices = raw.devices.len(), "Model extraction complete");
        Ok(raw)
    }
}

/// Build the HTTP client for the configured model API.
pub fn model_from_config(config: &ModelProviderConfig) -> Result<Arc<dyn LanguageModel>, ExtractError> {
    Ok(match config.api {
        ModelApi::OpenaiCompatible => Arc::new(OpenAiCompatibleModel::from_config(config)?),
        ModelApi::Anthropic => Arc::new(AnthropicModel::from_config(config)?),
    })
}

fn http_client(config: &ModelProviderConfig) -> Result<Client, ExtractError> {
    Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {}", e)))
}

async fn send(request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
    let response = request.send().await.context("model request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("model endpoint returned {}: {}", status.as_u16(), body);
    }
    response.json().await.context("model response parse failed")
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiCompatibleModel {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleModel {
    pub fn from_config(config: &ModelProviderConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            http: http_client(config)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let body = send(request).await?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .context("model response has no message content")
    }
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API.
pub struct AnthropicModel {
    http: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl AnthropicModel {
    pub fn from_config(config: &ModelProviderConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            http: http_client(config)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }

    fn payload(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": system,
            "messages": [{ "role": "user", "content": user }]
        })
    }
}

/// Concatenated text blocks of a messages API reply.
fn message_text(body: &Value) -> Option<String> {
    let text: String = body
        .get("content")?
        .as_array()?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let mut request = self
            .http
            .post(format!("{}/v1/messages", self.endpoint))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.payload(system, user));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let body = send(request).await?;
        message_text(&body).context("model response has no text content")
    }
}
