//! # agent-core
//!
//! Core agent logic: provider-agnostic model abstraction with startup
//! fallback, a schema-checked tool registry, the reasoning loop and the
//! interactive session around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SessionLoop                           │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │                       Agent                          │    │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐  │    │
//! │  │  │  Reasoning  │  │    Tools    │  │ ModelHandle  │  │    │
//! │  │  │    Loop     │──│   Registry  │──│ (LlmProvider)│  │    │
//! │  │  └─────────────┘  └─────────────┘  └──────────────┘  │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the agent independent of any particular
//! reasoning service; `ModelProvider` picks the first candidate model that
//! initializes.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, ErrorKind, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{LlmProvider, ModelConnector, ModelHandle, ModelProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use session::{LineSource, Session, SessionConfig, SessionLoop};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolSpec};
