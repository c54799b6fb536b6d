//! Conversation Messages
//!
//! Standard message format used across the agent system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// Assistant (LLM) response or tool-call intent
    Assistant,
    /// Tool observation (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Additional message metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool call expressed by an assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Tool call ID answered by a tool message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool that produced a tool message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Model that generated this (for assistant messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message carrying a tool-call intent
    pub fn tool_call(call: ToolCall) -> Self {
        let mut msg = Self::new(Role::Assistant, String::new());
        msg.metadata = Some(MessageMetadata {
            tool_call: Some(call),
            ..Default::default()
        });
        msg
    }

    /// Create a tool observation from `tool_name`, answering call `tool_call_id`
    pub fn tool(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.metadata = Some(MessageMetadata {
            tool_call_id,
            tool_name: Some(tool_name.into()),
            ..Default::default()
        });
        msg
    }

    /// Record which model produced this message
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(MessageMetadata::default).model = Some(model.into());
        self
    }

    /// The tool call carried by this message, if any
    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        self.metadata.as_ref()?.tool_call.as_ref()
    }

    /// Name of the tool this observation came from, if any
    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.as_ref()?.tool_name.as_deref()
    }
}

/// Conversation history for one session.
///
/// Append-only: messages are never reordered, edited or dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append every message of a completed turn, in order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.as_tool_call().is_none());
    }

    #[test]
    fn test_tool_messages_link_to_call() {
        let call = ToolCall::new("say_hello", serde_json::json!({"name": "Ada"})).with_id("call-1");
        let intent = Message::tool_call(call.clone());
        let observation = Message::tool("Hello Ada", &call.name, call.id.clone());

        assert_eq!(intent.role, Role::Assistant);
        assert_eq!(intent.as_tool_call().map(|c| c.name.as_str()), Some("say_hello"));
        assert_eq!(observation.tool_name(), Some("say_hello"));
        assert_eq!(
            observation.metadata.and_then(|m| m.tool_call_id).as_deref(),
            Some("call-1")
        );
    }

    #[test]
    fn test_conversation_appends_in_order() {
        let mut conv = Conversation::new();
        assert!(conv.is_empty());

        conv.push(Message::user("Hi"));
        conv.extend([Message::assistant("Hello!"), Message::user("Bye")]);

        assert_eq!(conv.len(), 3);
        let contents: Vec<_> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Hi", "Hello!", "Bye"]);
        assert_eq!(conv.last().map(|m| m.role), Some(Role::User));
    }
}
