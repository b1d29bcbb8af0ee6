//! Command line argument parsing
//!
//! Subcommands:
//! - `generate`: One-shot text or JSON generation through the guarded service
//! - `embed`: Compute an embedding vector
//! - `status`: Show circuit and quota state for a provider
//! - `reset-circuit`: Close a provider's circuit
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default user configuration file

use crate::env::keys::ANONYMOUS_SUBJECT;
use crate::llm::GenerationOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq)]
pub enum ExecutionMode {
    Generate(GenerateConfig),
    Embed {
        provider: Option<String>,
        text: String,
    },
    Status {
        provider: Option<String>,
        subject: String,
    },
    ResetCircuit {
        provider: Option<String>,
    },
    ShowConfig,
    InitConfig,
}

#[derive(Debug, PartialEq)]
pub struct GenerateConfig {
    pub provider: Option<String>,
    pub subject: String,
    pub prompt: String,
    pub json: bool,
    pub options: GenerationOptions,
}

#[derive(Debug, Parser)]
#[command(name = "fintrack-llm")]
#[command(author = "Fintrack Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resilient LLM client for the FinTrack finance assistant")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a completion for a prompt
    Generate {
        /// Prompt text
        prompt: String,
        /// Provider name (ollama, openai, mock); defaults to the configured one
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
        /// Subject charged for the request
        #[arg(short = 's', long = "subject", default_value = ANONYMOUS_SUBJECT)]
        subject: String,
        /// Request JSON output and pretty-print the decoded value
        #[arg(long = "json")]
        json: bool,
        /// Sampling temperature
        #[arg(long = "temperature")]
        temperature: Option<f32>,
        /// Maximum tokens to generate
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,
        /// Model override
        #[arg(short = 'm', long = "model")]
        model: Option<String>,
    },
    /// Compute an embedding vector for text
    Embed {
        /// Text to embed
        text: String,
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
    },
    /// Show circuit breaker and rate limit state
    Status {
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
        #[arg(short = 's', long = "subject", default_value = ANONYMOUS_SUBJECT)]
        subject: String,
    },
    /// Close a provider's circuit and clear its failure count
    ResetCircuit {
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Create a default configuration file in the user's home directory
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Generate {
                prompt,
                provider,
                subject,
                json,
                temperature,
                max_tokens,
                model,
            }) => {
                if prompt.trim().is_empty() {
                    return Err("Prompt must not be empty".to_string());
                }

                let mut options = GenerationOptions::new();
                options.temperature = *temperature;
                options.max_tokens = *max_tokens;
                options.model = model.clone();

                Ok(ExecutionMode::Generate(GenerateConfig {
                    provider: provider.clone(),
                    subject: subject.clone(),
                    prompt: prompt.clone(),
                    json: *json,
                    options,
                }))
            }
            Some(Commands::Embed { text, provider }) => Ok(ExecutionMode::Embed {
                provider: provider.clone(),
                text: text.clone(),
            }),
            Some(Commands::Status { provider, subject }) => Ok(ExecutionMode::Status {
                provider: provider.clone(),
                subject: subject.clone(),
            }),
            Some(Commands::ResetCircuit { provider }) => Ok(ExecutionMode::ResetCircuit {
                provider: provider.clone(),
            }),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => Ok(ExecutionMode::InitConfig),
            None => Err(
                "No command specified. Use 'fintrack-llm --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
