use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use washdash_config::AssistantConfig;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages (default for verbose)
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "washdash-chat")]
#[command(about = "Talk to the WASH dashboard assistant from a terminal")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute (defaults to chat if not provided)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Set log level
    /// If not specified, uses config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/washdash/assistant.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Gateway base URL (overrides config file)
    #[arg(long, global = true)]
    pub gateway_url: Option<String>,

    /// Ask for whole replies instead of streamed ones
    #[arg(long, global = true)]
    pub no_stream: bool,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Interactive chat session (default)
    Chat {
        /// Resume this conversation instead of the most recent one
        #[arg(long)]
        thread: Option<String>,
    },

    /// Send a single message and print the reply
    Ask {
        /// Message text
        message: String,

        /// Conversation to continue; a new one is started when omitted
        #[arg(long)]
        thread: Option<String>,
    },

    /// List conversations, most recent first
    Threads,

    /// Delete a conversation
    Delete {
        /// Conversation id
        thread_id: String,
    },
}

impl Cli {
    /// Fold command-line flags into the loaded config
    ///
    /// An explicit `--log-level` beats `--verbose`.
    pub fn apply_overrides(&self, config: &mut AssistantConfig) {
        if let Some(url) = &self.gateway_url {
            config.gateway.base_url = url.clone();
        }
        if self.no_stream {
            config.gateway.prefer_streaming = false;
        }
        if self.verbose {
            config.logging.level = LogLevel::Debug.as_str().to_string();
        }
        if let Some(level) = self.log_level {
            config.logging.level = level.as_str().to_string();
        }
    }
}
