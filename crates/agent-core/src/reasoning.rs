//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! Each turn alternates between asking the model what to do and running the
//! tools it asks for, until it produces a final answer.
//!
//! ```text
//! Thinking ──tool call──▶ Acting ──▶ Observing ──▶ Thinking
//!     │
//!     └──────text──────▶ Responding ──▶ Done
//! ```

use futures::StreamExt;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{Completion, FinishReason, GenerationOptions, ModelHandle, StreamChunk};
use crate::tool::{ToolCall, ToolRegistry, ToolResult, ToolSpec};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System instruction sent with every request
    pub system_prompt: String,

    /// Maximum model requests per turn before giving up
    pub max_steps: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_steps: 10,
            generation: GenerationOptions::default(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the available tools when they help answer the user, then reply in plain language. \
If you can answer directly without tools, do so.";

/// Where a turn currently is
#[derive(Debug)]
enum TurnState {
    Thinking,
    Acting(Vec<ToolCall>),
    Observing(Vec<ToolResult>),
    Responding(String),
    Done(String),
}

/// The main Agent struct
///
/// Owns the model handle and the conversation for a whole session.
pub struct Agent {
    handle: ModelHandle,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    conversation: Conversation,
}

impl Agent {
    /// Create a new agent
    pub fn new(handle: ModelHandle, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            handle,
            tools,
            config,
            conversation: Conversation::new(),
        }
    }

    /// Run one turn for `input`, passing each answer fragment to `on_fragment`
    /// as soon as it arrives.
    ///
    /// The turn's messages are committed to the conversation only when the
    /// turn completes; a failed turn leaves the conversation untouched.
    pub async fn run<F>(&mut self, input: &str, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        let specs = self.tools.specs();
        let options = self.generation_options();
        let mut staged = vec![Message::user(input)];
        let mut steps = 0;
        let mut state = TurnState::Thinking;

        loop {
            state = match state {
                TurnState::Thinking => {
                    if steps == self.config.max_steps {
                        tracing::warn!(max_steps = self.config.max_steps, "Turn hit the step limit");
                        return Err(AgentError::StepLimitExceeded(self.config.max_steps));
                    }
                    steps += 1;

                    let completion = self
                        .think(&staged, &specs, &options, &mut on_fragment)
                        .await?;

                    tracing::debug!(
                        step = steps,
                        finish_reason = ?completion.finish_reason,
                        usage = ?completion.usage,
                        "Model responded"
                    );

                    if !completion.tool_calls.is_empty() {
                        // Keep narration apart from whatever is streamed next
                        if !completion.content.is_empty() {
                            on_fragment("\n")?;
                        }
                        TurnState::Acting(completion.tool_calls)
                    } else if !completion.content.is_empty() {
                        TurnState::Responding(completion.content)
                    } else {
                        return Err(empty_response(completion.finish_reason));
                    }
                }
                TurnState::Acting(calls) => {
                    let results = calls
                        .into_iter()
                        .map(|call| {
                            tracing::debug!(tool = %call.name, "Executing tool");
                            let result = self.tools.execute(&call);
                            staged.push(Message::tool_call(call));
                            result
                        })
                        .collect();
                    TurnState::Observing(results)
                }
                TurnState::Observing(results) => {
                    for result in results {
                        let content = format_tool_result(&result);
                        staged.push(Message::tool(content, result.name, result.id));
                    }
                    TurnState::Thinking
                }
                TurnState::Responding(answer) => {
                    staged.push(Message::assistant(answer.clone()).with_model(self.handle.model()));
                    TurnState::Done(answer)
                }
                TurnState::Done(answer) => {
                    tracing::debug!(steps, messages = staged.len(), "Turn complete");
                    self.conversation.extend(staged);
                    return Ok(answer);
                }
            };
        }
    }

    /// Run a turn and return the full answer without observing fragments
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        self.run(question, |_| Ok(())).await
    }

    /// Submit the conversation so far and stream the model's reply
    async fn think<F>(
        &self,
        staged: &[Message],
        specs: &[ToolSpec],
        options: &GenerationOptions,
        on_fragment: &mut F,
    ) -> Result<Completion>
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        let context: Vec<Message> = self
            .conversation
            .messages()
            .iter()
            .chain(staged)
            .cloned()
            .collect();

        let mut stream = self
            .handle
            .provider()
            .complete_stream(&context, specs, options)
            .await?;

        let mut completion = Completion::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let StreamChunk::Delta(text) = &chunk {
                if !text.is_empty() {
                    on_fragment(text)?;
                }
            }
            completion.absorb(chunk);
        }

        Ok(completion)
    }

    fn generation_options(&self) -> GenerationOptions {
        let mut options = self.config.generation.clone();
        if options.system_prompt.is_none() && !self.config.system_prompt.is_empty() {
            options.system_prompt = Some(self.config.system_prompt.clone());
        }
        options
    }

    /// Identifier of the model answering this session
    pub fn model(&self) -> &str {
        self.handle.model()
    }

    /// Messages exchanged so far in this session
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}

/// Error for a reply with neither text nor function calls
fn empty_response(finish_reason: Option<FinishReason>) -> AgentError {
    let reason = match finish_reason {
        Some(FinishReason::ContentFilter) => "response blocked by the service's safety filter",
        Some(FinishReason::Length) => "model reached the token limit before producing an answer",
        _ => "model returned an empty response",
    };
    AgentError::Provider(reason.into())
}

/// Format tool result for conversation
fn format_tool_result(result: &ToolResult) -> String {
    if result.success {
        result.output.clone()
    } else {
        format!("Error: {}", result.output)
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    handle: Option<ModelHandle>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            handle: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn model(mut self, handle: ModelHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub fn max_steps(mut self, max: usize) -> Self {
        self.config.max_steps = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let handle = self
            .handle
            .ok_or_else(|| AgentError::Config("Model handle is required".into()))?;

        if self.config.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be at least 1".into()));
        }

        Ok(Agent::new(handle, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::provider::mock::ScriptedProvider;
    use serde_json::json;

    fn agent(provider: ScriptedProvider) -> Agent {
        AgentBuilder::new()
            .model(ModelHandle::new(Box::new(provider)))
            .tools(ToolRegistry::with_builtins().unwrap())
            .max_steps(4)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_direct_answer_streams_fragments() {
        let mut agent = agent(ScriptedProvider::new("m").fragments(["Hel", "lo", "!"]));
        let mut seen = Vec::new();

        let answer = agent
            .run("hi", |fragment| {
                seen.push(fragment.to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(answer, "Hello!");
        assert_eq!(seen, ["Hel", "lo", "!"]);

        let roles: Vec<_> = agent.conversation().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = ScriptedProvider::new("m")
            .tool_call("calculator", json!({"a": 2, "b": 3}))
            .text("2 + 3 is 5.");
        let requests = provider.requests();
        let mut agent = agent(provider);

        let answer = agent.ask("what is 2 + 3?").await.unwrap();
        assert_eq!(answer, "2 + 3 is 5.");

        let messages = agent.conversation().messages();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(messages[1].as_tool_call().map(|c| c.name.as_str()), Some("calculator"));
        assert!(messages[2].content.contains('5'));
        assert_eq!(messages[2].tool_name(), Some("calculator"));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools, ["calculator", "say_hello"]);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let provider = ScriptedProvider::new("m")
            .tool_call("unknown_tool", json!({}))
            .tool_call("calculator", json!({"a": "x"}))
            .text("Sorry, I could not do that.");
        let mut agent = agent(provider);

        agent.ask("break things").await.unwrap();

        let observations: Vec<_> = agent
            .conversation()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(observations.len(), 2);
        assert!(observations[0].contains("Tool not found: unknown_tool"));
        assert!(observations[1].contains("Invalid arguments for tool 'calculator'"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let provider = ScriptedProvider::new("m").always_tool_call("say_hello", json!({"name": "loop"}));
        let requests = provider.requests();
        let mut agent = agent(provider);

        let err = agent.ask("never finish").await.unwrap_err();

        assert!(matches!(err, AgentError::StepLimitExceeded(4)));
        assert_eq!(requests.lock().unwrap().len(), 4);
        assert!(agent.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_conversation_untouched() {
        let provider = ScriptedProvider::new("m")
            .text("First answer.")
            .error_after(["partial "], AgentError::RateLimited("quota".into()))
            .text("Third answer.");
        let mut agent = agent(provider);

        agent.ask("one").await.unwrap();
        let err = agent.ask("two").await.unwrap_err();
        assert!(matches!(err, AgentError::RateLimited(_)));
        assert_eq!(agent.conversation().len(), 2);

        agent.ask("three").await.unwrap();
        let contents: Vec<_> = agent
            .conversation()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["one", "First answer.", "three", "Third answer."]);
    }

    #[tokio::test]
    async fn test_empty_response_is_provider_error() {
        let mut agent = agent(ScriptedProvider::new("m").chunks(Vec::new()));
        let err = agent.ask("hello?").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }

    fn finished(reason: FinishReason) -> StreamChunk {
        StreamChunk::Done {
            finish_reason: Some(reason),
            usage: None,
        }
    }

    #[tokio::test]
    async fn test_filtered_response_names_the_safety_filter() {
        let provider = ScriptedProvider::new("m").chunks(vec![finished(FinishReason::ContentFilter)]);
        let mut agent = agent(provider);

        let err = agent.ask("x").await.unwrap_err();

        assert!(err.to_string().contains("safety filter"), "{err}");
        assert!(agent.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_empty_response_names_the_token_limit() {
        let provider = ScriptedProvider::new("m").chunks(vec![finished(FinishReason::Length)]);
        let mut agent = agent(provider);

        let err = agent.ask("x").await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(ref m) if m.contains("token limit")), "{err}");
    }

    #[tokio::test]
    async fn test_narration_is_separated_from_the_answer() {
        let provider = ScriptedProvider::new("m")
            .chunks(vec![
                StreamChunk::Delta("Let me check.".into()),
                StreamChunk::ToolCall(ToolCall::new("calculator", json!({"a": 2, "b": 3}))),
                finished(FinishReason::ToolUse),
            ])
            .text("It is 5.");
        let mut agent = agent(provider);
        let mut streamed = String::new();

        let answer = agent
            .run("2 + 3?", |fragment| {
                streamed.push_str(fragment);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(answer, "It is 5.");
        assert_eq!(streamed, "Let me check.\nIt is 5.");
    }

    #[test]
    fn test_builder_requires_model() {
        assert!(matches!(AgentBuilder::new().build(), Err(AgentError::Config(_))));
    }
}
