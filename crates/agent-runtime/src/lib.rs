//! # agent-runtime
//!
//! Runtime providers for the agent.
//!
//! ## Providers
//!
//! - **Gemini**: Google Gemini REST API with SSE streaming and native
//!   function calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::ModelProvider;
//! use agent_runtime::{GeminiConfig, GeminiConnector};
//!
//! let connector = GeminiConnector::new(GeminiConfig::from_env()?)?;
//! let handle = ModelProvider::new(connector)
//!     .acquire(&["gemini-2.5-flash", "gemini-2.0-flash"])
//!     .await?;
//! ```

pub mod gemini;
pub mod sse;

pub use gemini::{ApiKey, GeminiConfig, GeminiConnector, GeminiProvider};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, LlmProvider, Message, ModelConnector, ModelHandle, ModelProvider, Result,
    Role, ToolRegistry,
};
