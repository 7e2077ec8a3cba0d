//! Command-line interface parsing and startup wiring.
//!
//! Parses arguments, loads configuration, constructs and registers the
//! capability providers, then hands off to the chat loop.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::providers::gmail::GmailProvider;
use crate::providers::slack::SlackProvider;
use crate::providers::{Provider, ProviderRegistry};
use crate::ui::run_chat;

#[derive(Parser)]
#[command(name = "valet")]
#[command(about = "A terminal assistant that routes requests to Claude or to pluggable data providers")]
#[command(
    long_about = "Valet is a full-screen terminal assistant. Free-text requests are routed \
either to Claude or to capability providers (Gmail, Slack) whose results are \
summarized back into the transcript.\n\n\
Environment Variables:\n\
  ANTHROPIC_API_KEY   Your Anthropic API key (required)\n\
  CLAUDE_MODEL        Model id override (optional)\n\
  GMAIL_ACCESS_TOKEN  Gmail OAuth access token (optional)\n\
  SLACK_TOKEN         Slack bot token (optional)\n\n\
Controls:\n\
  Type                Enter your request in the input field\n\
  Enter               Send the request\n\
  Up/Down/Mouse       Scroll through the transcript\n\
  Ctrl+L              Clear the transcript\n\
  Ctrl+C              Quit the application\n\n\
Example requests:\n\
  summarise my unread e-mails\n\
  what's on this webpage? bbc.co.uk\n\
  summarize slack channel #general"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model id to use for requests
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Append internal diagnostics to this file (filtered by RUST_LOG)
    #[arg(long, value_name = "FILE")]
    pub trace_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive session (default)
    Chat,
    /// List registered providers and their capabilities
    Providers,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.trace_file.as_deref())?;

    let mut config = Config::load()?;
    if let Some(model) = args.model {
        config.model = model;
    }

    let registry = Arc::new(build_registry());

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Providers => {
            print_providers(&registry);
            Ok(())
        }
        Commands::Chat => run_chat(config, registry).await,
    }
}

/// Register every provider that can find its credentials. A provider
/// that cannot is skipped with a warning; the session still starts.
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    match GmailProvider::new() {
        Ok(provider) => {
            registry.register(Arc::new(provider));
            debug!("registered Gmail provider");
        }
        Err(err) => warn!(%err, "Gmail provider unavailable"),
    }

    match SlackProvider::new() {
        Ok(provider) => {
            registry.register(Arc::new(provider));
            debug!("registered Slack provider");
        }
        Err(err) => warn!(%err, "Slack provider unavailable"),
    }

    registry
}

fn print_providers(registry: &ProviderRegistry) {
    let mut names = registry.list();
    names.sort();
    if names.is_empty() {
        println!("No providers registered. Set SLACK_TOKEN or GMAIL_ACCESS_TOKEN to enable one.");
        return;
    }
    for name in names {
        let Ok(provider) = registry.get(&name) else {
            continue;
        };
        println!("{name}");
        for capability in provider.capabilities() {
            println!("  {} — {}", capability.name, capability.description);
            println!("    commands: {}", capability.commands.join(", "));
        }
    }
}

/// The TUI owns the terminal, so diagnostics go to a file or nowhere.
fn init_tracing(path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("valet=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
