//! Scripted Provider
//!
//! For testing and demo purposes. Replays canned responses in order and
//! records every request it receives.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelConnector, StreamChunk};
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::tool::{ToolCall, ToolSpec};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Reply {
    Chunks(Vec<StreamChunk>),
    Fail(AgentError),
    FailMidStream(Vec<StreamChunk>, AgentError),
}

/// A request as seen by the scripted provider
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// Provider that answers from a script
pub struct ScriptedProvider {
    model: String,
    replies: Mutex<VecDeque<Reply>>,
    /// Replayed once the script runs out
    repeat: Option<Vec<StreamChunk>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    next_call_id: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            replies: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            next_call_id: Mutex::new(0),
        }
    }

    /// Answer the next request with these text fragments
    #[must_use]
    pub fn fragments<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chunks: Vec<_> = fragments
            .into_iter()
            .map(|f| StreamChunk::Delta(f.into()))
            .collect();
        chunks.push(done(FinishReason::Stop));
        self.push(Reply::Chunks(chunks))
    }

    /// Answer the next request with a single block of text
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.fragments([text.into()])
    }

    /// Answer the next request with a function call
    #[must_use]
    pub fn tool_call(self, name: &str, arguments: serde_json::Value) -> Self {
        let chunks = vec![
            StreamChunk::ToolCall(ToolCall::new(name, arguments)),
            done(FinishReason::ToolUse),
        ];
        self.push(Reply::Chunks(chunks))
    }

    /// Answer the next request with arbitrary chunks
    #[must_use]
    pub fn chunks(self, chunks: Vec<StreamChunk>) -> Self {
        self.push(Reply::Chunks(chunks))
    }

    /// Fail the next request before any chunk is produced
    #[must_use]
    pub fn error(self, error: AgentError) -> Self {
        self.push(Reply::Fail(error))
    }

    /// Stream these fragments, then fail
    #[must_use]
    pub fn error_after<I, S>(self, fragments: I, error: AgentError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = fragments
            .into_iter()
            .map(|f| StreamChunk::Delta(f.into()))
            .collect();
        self.push(Reply::FailMidStream(chunks, error))
    }

    /// Keep requesting the same function call forever once the script is exhausted
    #[must_use]
    pub fn always_tool_call(mut self, name: &str, arguments: serde_json::Value) -> Self {
        self.repeat = Some(vec![
            StreamChunk::ToolCall(ToolCall::new(name, arguments)),
            done(FinishReason::ToolUse),
        ]);
        self
    }

    /// Shared view of every request received so far
    pub fn requests(&self) -> Arc<Mutex<Vec<RecordedRequest>>> {
        Arc::clone(&self.requests)
    }

    fn push(self, reply: Reply) -> Self {
        lock(&self.replies).push_back(reply);
        self
    }

    fn assign_ids(&self, chunks: Vec<StreamChunk>) -> Vec<StreamChunk> {
        chunks
            .into_iter()
            .map(|chunk| match chunk {
                StreamChunk::ToolCall(call) if call.id.is_none() => {
                    let mut next = lock(&self.next_call_id);
                    *next += 1;
                    StreamChunk::ToolCall(call.with_id(format!("call-{next}")))
                }
                other => other,
            })
            .collect()
    }
}

fn done(finish_reason: FinishReason) -> StreamChunk {
    StreamChunk::Done {
        finish_reason: Some(finish_reason),
        usage: None,
    }
}

fn into_stream(items: Vec<Result<StreamChunk>>) -> CompletionStream {
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        lock(&self.requests).push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(Reply::Chunks(chunks)) => {
                Ok(into_stream(self.assign_ids(chunks).into_iter().map(Ok).collect()))
            }
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::FailMidStream(chunks, error)) => {
                let mut items: Vec<_> = chunks.into_iter().map(Ok).collect();
                items.push(Err(error));
                Ok(into_stream(items))
            }
            None => match &self.repeat {
                Some(chunks) => Ok(into_stream(
                    self.assign_ids(chunks.clone()).into_iter().map(Ok).collect(),
                )),
                None => Err(AgentError::Provider("script exhausted".into())),
            },
        }
    }
}

/// Connector that hands out scripted providers per model identifier
#[derive(Default)]
pub struct ScriptedConnector {
    outcomes: Mutex<HashMap<String, std::result::Result<ScriptedProvider, String>>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn succeed(self, model: &str, provider: ScriptedProvider) -> Self {
        lock(&self.outcomes).insert(model.to_string(), Ok(provider));
        self
    }

    #[must_use]
    pub fn fail(self, model: &str, reason: &str) -> Self {
        lock(&self.outcomes).insert(model.to_string(), Err(reason.to_string()));
        self
    }

    /// Shared view of the model identifiers tried so far, in order
    pub fn attempts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl ModelConnector for ScriptedConnector {
    async fn connect(&self, model: &str) -> Result<Box<dyn LlmProvider>> {
        lock(&self.attempts).push(model.to_string());

        match lock(&self.outcomes).remove(model) {
            Some(Ok(provider)) => Ok(Box::new(provider)),
            Some(Err(reason)) => Err(AgentError::ProviderUnavailable(reason)),
            None => Err(AgentError::ProviderUnavailable(format!("unknown model '{model}'"))),
        }
    }
}
