//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for reasoning services so the agent works with
//! any backend without code changes, and resolves a working model from an
//! ordered list of candidates at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::ModelProvider;
//!
//! let handle = ModelProvider::new(connector)
//!     .acquire(&["gemini-2.5-flash", "gemini-2.0-flash"])
//!     .await?;
//!
//! let stream = handle.provider().complete_stream(&messages, &tools, &options).await?;
//! ```

pub mod mock;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::{AgentError, CandidateFailure, CandidateFailures, Result};
use crate::message::Message;
use crate::tool::{ToolCall, ToolSpec};

/// Configuration for LLM generation
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    pub top_p: Option<f32>,

    /// Stop sequences
    pub stop_sequences: Vec<String>,

    /// System instruction, sent separately from the conversation
    pub system_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 2048,
            top_p: None,
            stop_sequences: Vec::new(),
            system_prompt: None,
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Default)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Function calls requested by the model, in order
    pub tool_calls: Vec<ToolCall>,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// Fold one streamed chunk into the accumulated completion
    pub fn absorb(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Delta(text) => self.content.push_str(&text),
            StreamChunk::ToolCall(call) => self.tool_calls.push(call),
            StreamChunk::Done { finish_reason, usage } => {
                self.finish_reason = finish_reason.or(self.finish_reason.take());
                self.usage = usage.or(self.usage.take());
            }
        }
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// A chunk from streaming completion
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    /// The next text fragment
    Delta(String),

    /// A complete function call
    ToolCall(ToolCall),

    /// End-of-response metadata
    Done {
        finish_reason: Option<FinishReason>,
        usage: Option<TokenUsage>,
    },
}

/// Stream type for completion streaming
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier of the model this provider is bound to
    fn model(&self) -> &str;

    /// Generate a streaming completion
    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

/// Initializes a provider for one candidate model identifier
#[async_trait]
pub trait ModelConnector: Send + Sync {
    async fn connect(&self, model: &str) -> Result<Box<dyn LlmProvider>>;
}

/// A provider bound to the model that was successfully initialized.
///
/// Not `Clone`: the agent that receives it owns it for the whole session.
pub struct ModelHandle {
    provider: Box<dyn LlmProvider>,
}

impl ModelHandle {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("model", &self.model()).finish()
    }
}

/// Resolves a working model from priority-ordered candidates
pub struct ModelProvider<C> {
    connector: C,
}

impl<C: ModelConnector> ModelProvider<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Try each candidate in order and return the first that initializes.
    ///
    /// Later candidates are never attempted once one succeeds. When every
    /// candidate fails the error carries each candidate's own reason.
    pub async fn acquire<S: AsRef<str>>(&self, candidates: &[S]) -> Result<ModelHandle> {
        let mut failures = Vec::new();

        for candidate in candidates {
            let model = candidate.as_ref();
            tracing::debug!(model, "Initializing candidate model");

            match self.connector.connect(model).await {
                Ok(provider) => {
                    if !failures.is_empty() {
                        tracing::info!(model, skipped = failures.len(), "Fell back to candidate model");
                    }
                    return Ok(ModelHandle::new(provider));
                }
                Err(e) => {
                    tracing::warn!(model, error = %e, "Candidate model failed");
                    failures.push(CandidateFailure {
                        model: model.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(AgentError::ModelUnavailable(CandidateFailures(failures)))
    }
}
