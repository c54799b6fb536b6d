//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` and `ModelConnector` for the Google
//! Gemini REST API, with SSE streaming and native function calling.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelConnector,
        StreamChunk, TokenUsage,
    },
    tool::{ToolCall, ToolSpec},
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::sse;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables consulted for the credential, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Credential for the Gemini API. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a non-empty key
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(AgentError::MissingCredential(API_KEY_VARS.join(" or ")));
        }
        Ok(Self(key))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: ApiKey,

    /// API root, without trailing slash
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 120,
        }
    }

    /// Read the credential and endpoint settings from the environment.
    ///
    /// Fails with `MissingCredential` when no key variable is set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`GeminiConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = API_KEY_VARS
            .iter()
            .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| AgentError::MissingCredential(API_KEY_VARS.join(" or ")))?;

        let mut config = Self::new(ApiKey::new(key)?);

        if let Some(url) = lookup("GEMINI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup("AGENT_TIMEOUT_SECS") {
            config.timeout_secs = secs
                .parse()
                .map_err(|_| AgentError::Config(format!("AGENT_TIMEOUT_SECS must be a number of seconds, got '{secs}'")))?;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Initializes Gemini models by checking them against the API
pub struct GeminiConnector {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl ModelConnector for GeminiConnector {
    async fn connect(&self, model: &str) -> Result<Box<dyn LlmProvider>> {
        let model = model.trim().trim_start_matches("models/");
        if model.is_empty() {
            return Err(AgentError::Config("empty model identifier".into()));
        }

        let url = format!("{}/models/{}", self.config.base_url, model);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", self.config.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let info: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("model metadata: {e}")))?;
        let methods = info["supportedGenerationMethods"].as_array();
        if let Some(methods) = methods {
            if !methods.iter().any(|m| m == "generateContent") {
                return Err(AgentError::Provider(format!("{model} does not support generateContent")));
            }
        }

        tracing::info!(model, "Connected to Gemini");
        Ok(Box::new(GeminiProvider {
            model: model.to_string(),
            config: self.config.clone(),
            http: self.http.clone(),
        }))
    }
}

/// Gemini LLM provider bound to one model
pub struct GeminiProvider {
    model: String,
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiProvider {
    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = build_request_body(messages, tools, options);

        tracing::debug!(model = %self.model, messages = messages.len(), "Gemini streaming request");

        let response = self
            .http
            .post(self.stream_url())
            .header("x-goog-api-key", self.config.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let chunks = sse::data_events(response)
            .map(|event| event.and_then(|data| parse_chunk(&data)))
            .flat_map(|parsed| {
                let items: Vec<Result<StreamChunk>> = match parsed {
                    Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(items)
            });

        Ok(Box::pin(chunks))
    }
}

fn transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() || err.is_connect() {
        AgentError::ProviderUnavailable(err.to_string())
    } else {
        AgentError::Provider(err.to_string())
    }
}

/// Map a non-success HTTP status onto the error taxonomy
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        StatusCode::NOT_FOUND => AgentError::Provider(format!("model not found: {detail}")),
        s if s.is_server_error() => AgentError::ProviderUnavailable(format!("HTTP {s}: {detail}")),
        s => AgentError::Provider(format!("HTTP {s}: {detail}")),
    }
}

/// Build the JSON request body for the Gemini API.
///
/// Consecutive messages that map to the same Gemini role are merged into one
/// content entry, so parallel function calls and their responses stay paired.
pub fn build_request_body(
    messages: &[Message],
    tools: &[ToolSpec],
    options: &GenerationOptions,
) -> Value {
    let mut contents: Vec<Value> = Vec::new();
    let mut current_role = "";

    for msg in messages {
        let (role, part) = match msg.role {
            Role::User => ("user", json!({ "text": msg.content })),
            Role::Assistant => match msg.as_tool_call() {
                Some(call) => (
                    "model",
                    json!({ "functionCall": { "name": call.name, "args": call.arguments } }),
                ),
                None => ("model", json!({ "text": msg.content })),
            },
            Role::Tool => (
                "user",
                json!({
                    "functionResponse": {
                        "name": msg.tool_name().unwrap_or_default(),
                        "response": { "result": msg.content },
                    }
                }),
            ),
        };

        match contents.last_mut() {
            Some(last) if current_role == role => {
                if let Some(parts) = last["parts"].as_array_mut() {
                    parts.push(part);
                }
            }
            _ => contents.push(json!({ "role": role, "parts": [part] })),
        }
        current_role = role;
    }

    let mut generation = json!({
        "temperature": options.temperature,
        "maxOutputTokens": options.max_tokens,
    });
    if let Some(top_p) = options.top_p {
        generation["topP"] = json!(top_p);
    }
    if !options.stop_sequences.is_empty() {
        generation["stopSequences"] = json!(options.stop_sequences);
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": generation,
    });

    if let Some(system) = options.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }

    if !tools.is_empty() {
        let declarations: Vec<Value> = tools.iter().map(to_function_declaration).collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

fn to_function_declaration(spec: &ToolSpec) -> Value {
    let mut declaration = json!({
        "name": spec.name,
        "description": spec.description,
    });
    if !spec.parameters.is_empty() {
        declaration["parameters"] = spec.parameters_json_schema();
    }
    declaration
}

/// Parse one streamed `GenerateContentResponse` into chunks
pub fn parse_chunk(data: &str) -> Result<Vec<StreamChunk>> {
    let json: Value = serde_json::from_str(data)
        .map_err(|e| AgentError::Parse(format!("invalid stream event: {e}")))?;

    if let Some(error) = json.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(match error["code"].as_u64() {
            Some(429) => AgentError::RateLimited(message.to_string()),
            Some(401 | 403) => AgentError::Auth(message.to_string()),
            _ => AgentError::Provider(message.to_string()),
        });
    }

    let mut chunks = Vec::new();
    let candidate = json["candidates"].get(0);

    if candidate.is_none() {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(AgentError::Provider(format!("prompt blocked: {reason}")));
        }
    }

    if let Some(candidate) = candidate {
        for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    chunks.push(StreamChunk::Delta(text.to_string()));
                }
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc["name"]
                    .as_str()
                    .ok_or_else(|| AgentError::Parse("functionCall without a name".into()))?;
                let args = match &fc["args"] {
                    Value::Null => json!({}),
                    args => args.clone(),
                };
                let call = ToolCall::new(name, args).with_id(uuid::Uuid::new_v4().to_string());
                chunks.push(StreamChunk::ToolCall(call));
            }
        }
    }

    let finish_reason = candidate
        .and_then(|c| c["finishReason"].as_str())
        .map(finish_reason);
    let usage = json.get("usageMetadata").map(token_usage);

    if finish_reason.is_some() || usage.is_some() {
        chunks.push(StreamChunk::Done { finish_reason, usage });
    }

    Ok(chunks)
}

fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Error,
    }
}

fn token_usage(meta: &Value) -> TokenUsage {
    let count = |key: &str| u32::try_from(meta[key].as_u64().unwrap_or(0)).unwrap_or(u32::MAX);
    TokenUsage {
        prompt_tokens: count("promptTokenCount"),
        completion_tokens: count("candidatesTokenCount"),
        total_tokens: count("totalTokenCount"),
    }
}
