//! Session Management
//!
//! Drives an interactive session: one line of input per turn, answers
//! streamed to the output as they arrive, and failures contained to the turn
//! that raised them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::error::Result;
use crate::reasoning::Agent;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping for one interactive session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Turns started (exit commands and blank lines are not turns)
    pub turns: usize,

    /// Turns that ended in a recoverable error
    pub failed_turns: usize,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,

    /// Whether session is active
    pub active: bool,
}

impl Session {
    /// Create a new session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            turns: 0,
            failed_turns: 0,
            created_at: now,
            updated_at: now,
            active: true,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// End the session
    pub fn end(&mut self) {
        self.active = false;
        self.touch();
    }

    /// Duration since creation
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Where user input comes from
pub trait LineSource {
    /// Show `prompt` and read one line; `None` means the input is finished.
    fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>>;
}

/// Text surface of the interactive session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Input that ends the session, compared case-insensitively
    pub exit_keyword: String,

    /// Prompt shown when reading input
    pub input_prompt: String,

    /// Written before each streamed answer
    pub answer_prefix: String,

    /// Lines written once when the session starts
    pub greeting: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exit_keyword: "quit".into(),
            input_prompt: "You: ".into(),
            answer_prefix: "Assistant: ".into(),
            greeting: vec![
                "Welcome! I'm your AI assistant. Type 'quit' to exit.".into(),
                "You can ask me to perform calculations or chat with me.".into(),
            ],
        }
    }
}

/// Interactive read/answer loop around an [`Agent`]
pub struct SessionLoop {
    agent: Agent,
    config: SessionConfig,
    session: Session,
}

impl SessionLoop {
    pub fn new(agent: Agent, config: SessionConfig) -> Self {
        Self {
            agent,
            config,
            session: Session::new(),
        }
    }

    fn is_exit(&self, input: &str) -> bool {
        input.to_lowercase() == self.config.exit_keyword.to_lowercase()
    }

    /// Run until the exit keyword or end of input.
    ///
    /// Recoverable turn failures are reported on `output` and the loop moves
    /// on to the next input. Anything else (including failing to write to
    /// `output`) ends the session with an error.
    pub async fn run<S, W>(&mut self, input: &mut S, output: &mut W) -> Result<Session>
    where
        S: LineSource,
        W: Write,
    {
        tracing::info!(session = %self.session.id, model = self.agent.model(), "Session started");

        for line in &self.config.greeting {
            writeln!(output, "{line}")?;
        }

        loop {
            writeln!(output)?;
            output.flush()?;

            let Some(line) = input.read_line(&self.config.input_prompt)? else {
                tracing::debug!("End of input");
                break;
            };
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if self.is_exit(line) {
                break;
            }

            self.session.turns += 1;
            self.session.touch();

            writeln!(output)?;
            write!(output, "{}", self.config.answer_prefix)?;
            output.flush()?;

            let outcome = self
                .agent
                .run(line, |fragment| {
                    output.write_all(fragment.as_bytes())?;
                    output.flush()
                })
                .await;

            match outcome {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    self.session.failed_turns += 1;
                    tracing::warn!(turn = self.session.turns, kind = ?e.kind(), error = %e, "Turn failed");
                    writeln!(output)?;
                    writeln!(output, "[Error] {e}")?;
                    write!(output, "{}", e.user_message())?;
                }
                Err(e) => {
                    tracing::error!(turn = self.session.turns, error = %e, "Session aborted");
                    self.session.end();
                    return Err(e);
                }
            }
            writeln!(output)?;
        }

        self.session.end();
        tracing::info!(
            session = %self.session.id,
            turns = self.session.turns,
            failed_turns = self.session.failed_turns,
            duration_secs = self.session.duration().num_seconds(),
            "Session ended"
        );
        Ok(self.session.clone())
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::provider::mock::ScriptedProvider;
    use crate::provider::ModelHandle;
    use crate::reasoning::AgentBuilder;
    use crate::tool::ToolRegistry;
    use std::collections::VecDeque;

    struct Lines(VecDeque<String>);

    impl Lines {
        fn of(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| (*l).to_string()).collect())
        }
    }

    impl LineSource for Lines {
        fn read_line(&mut self, _prompt: &str) -> std::io::Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    fn session_loop(provider: ScriptedProvider) -> SessionLoop {
        let agent = AgentBuilder::new()
            .model(ModelHandle::new(Box::new(provider)))
            .tools(ToolRegistry::with_builtins().unwrap())
            .max_steps(3)
            .build()
            .unwrap();
        SessionLoop::new(agent, SessionConfig::default())
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert!(session.active);
        assert_eq!(session.turns, 0);
    }

    #[test]
    fn test_session_end_records_duration() {
        let mut session = Session::new();
        session.end();

        assert!(!session.active);
        assert!(session.updated_at >= session.created_at);
        assert!(session.duration() >= chrono::Duration::zero());
    }

    #[tokio::test]
    async fn test_exit_after_one_turn() {
        let provider = ScriptedProvider::new("m").fragments(["Hi ", "there"]);
        let requests = provider.requests();
        let mut session = session_loop(provider);
        let mut input = Lines::of(&["hello", "QUIT", "never read"]);
        let mut output = Vec::new();

        let summary = session.run(&mut input, &mut output).await.unwrap();

        assert_eq!(summary.turns, 1);
        assert!(!summary.active);
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(input.0.len(), 1);
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Assistant: Hi there"), "{text}");
    }

    #[tokio::test]
    async fn test_exit_immediately() {
        let provider = ScriptedProvider::new("m");
        let requests = provider.requests();
        let mut session = session_loop(provider);
        let mut output = Vec::new();

        let summary = session.run(&mut Lines::of(&["  quit  "]), &mut output).await.unwrap();

        assert_eq!(summary.turns, 0);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_turn_does_not_end_session() {
        let provider = ScriptedProvider::new("m")
            .text("First.")
            .error(AgentError::Auth("API key not valid".into()))
            .text("Third.");
        let mut session = session_loop(provider);
        let mut output = Vec::new();

        let summary = session
            .run(&mut Lines::of(&["one", "two", "three", "quit"]), &mut output)
            .await
            .unwrap();

        assert_eq!(summary.turns, 3);
        assert_eq!(summary.failed_turns, 1);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[Error] Authentication failed: API key not valid"), "{text}");
        assert!(text.contains("invalid or out of quota"));
        assert!(text.contains("Third."));

        let contents: Vec<_> = session
            .agent()
            .conversation()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["one", "First.", "three", "Third."]);
    }

    #[tokio::test]
    async fn test_step_limit_is_reported() {
        let provider = ScriptedProvider::new("m").always_tool_call("calculator", serde_json::json!({"a": 1, "b": 1}));
        let mut session = session_loop(provider);
        let mut output = Vec::new();

        let summary = session.run(&mut Lines::of(&["loop", "quit"]), &mut output).await.unwrap();

        assert_eq!(summary.failed_turns, 1);
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("step limit (3) exceeded"), "{text}");
    }

    #[tokio::test]
    async fn test_blank_lines_and_end_of_input() {
        let provider = ScriptedProvider::new("m").text("ok");
        let requests = provider.requests();
        let mut session = session_loop(provider);
        let mut output = Vec::new();

        let summary = session.run(&mut Lines::of(&["", "   ", "go"]), &mut output).await.unwrap();

        assert_eq!(summary.turns, 1);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_output_is_fatal() {
        struct Closed;

        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut session = session_loop(ScriptedProvider::new("m").text("unused"));
        let err = session.run(&mut Lines::of(&["hello"]), &mut Closed).await.unwrap_err();
        assert!(matches!(err, AgentError::Io(_)));
    }
}
