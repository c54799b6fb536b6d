//! Interactive agent
//!
//! Picks the first Gemini model that initializes, registers the built-in
//! tools and chats on the terminal until the exit keyword or end of input.

mod config;
mod input;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentBuilder, ModelProvider, SessionConfig, SessionLoop, ToolRegistry};
use agent_runtime::{GeminiConfig, GeminiConnector};

use crate::config::Cli;
use crate::input::LineEditor;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with streamed answers
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let tools = ToolRegistry::with_builtins().context("failed to register tools")?;
    tracing::info!(tools = ?tools.names(), "Registered tools");

    let gemini = GeminiConfig::from_env()?;
    let connector = GeminiConnector::new(gemini)?;

    let candidates = cli.candidates();
    let handle = ModelProvider::new(connector)
        .acquire(&candidates)
        .await
        .context("none of the preferred models worked; check the model names and your API key")?;
    tracing::info!(model = handle.model(), "Using model");

    let agent = AgentBuilder::new()
        .model(handle)
        .tools(tools)
        .temperature(cli.temperature)
        .max_steps(usize::try_from(cli.max_steps)?)
        .build()?;

    let session_config = SessionConfig {
        exit_keyword: cli.exit_keyword,
        ..SessionConfig::default()
    };

    let mut input = LineEditor::new()?;
    let mut output = std::io::stdout();

    SessionLoop::new(agent, session_config)
        .run(&mut input, &mut output)
        .await?;

    Ok(())
}
