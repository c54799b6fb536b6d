//! Command-line and environment configuration

use clap::Parser;

/// Candidate models tried when none are configured, most preferred first
pub const DEFAULT_MODELS: [&str; 4] = [
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.0-flash",
    "gemini-2.0-pro",
];

/// Chat with a tool-using AI assistant.
///
/// The API key is read from GEMINI_API_KEY (or GOOGLE_API_KEY), either from
/// the environment or a `.env` file in the working directory.
#[derive(Parser, Debug)]
#[command(name = "agent", version)]
pub struct Cli {
    /// Candidate model, most preferred first. Repeat or comma-separate.
    #[arg(short, long = "model", env = "AGENT_MODELS", value_delimiter = ',')]
    pub models: Vec<String>,

    /// Maximum model requests per turn
    #[arg(long, env = "AGENT_MAX_STEPS", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_steps: u32,

    /// Sampling temperature
    #[arg(long, env = "AGENT_TEMPERATURE", default_value_t = 0.0)]
    pub temperature: f32,

    /// Input that ends the session
    #[arg(long, default_value = "quit")]
    pub exit_keyword: String,
}

impl Cli {
    /// Configured candidates, or the built-in list when none were given
    pub fn candidates(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .models
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if configured.is_empty() {
            DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect()
        } else {
            configured
        }
    }
}
