//! `statectl`: command-line adapter over the state store.
//!
//! Works directly on the configured state files; callbacks registered on a key
//! fire from this process when it writes that key.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use inquire::InquireError;
use serde_json::Value;
use tracing::debug;

use configs::AppConfig;
use service::commands::{NoPrompt, Prompter, StateCommands};
use service::{runtime, ServiceError};

#[derive(Parser, Debug)]
#[command(name = "statectl", version, about = "Read and write the shared state store")]
struct Cli {
    /// Config file (defaults to $CONFIG_PATH, then ./config.toml, then built-in defaults)
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Never prompt; missing arguments cancel the command
    #[arg(long)]
    no_input: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set a key. VALUE is parsed as JSON, falling back to a plain string.
    #[command(name = "set")]
    Set { key: Option<String>, value: Option<String> },
    /// Print the value stored under a key as JSON; exits 1 when unset.
    #[command(name = "get")]
    Get { key: Option<String> },
    /// Register a callback identifier to run whenever KEY changes.
    #[command(name = "register-listener")]
    RegisterListener { key: Option<String>, callback: Option<String> },
    /// List callback identifiers registered for a key, in invocation order.
    #[command(name = "listeners")]
    Listeners { key: String },
}

struct InquirePrompter;

#[async_trait]
impl Prompter for InquirePrompter {
    async fn prompt(&self, message: &str) -> Result<Option<String>, ServiceError> {
        let message = message.to_string();
        let answer = tokio::task::spawn_blocking(move || inquire::Text::new(&message).prompt_skippable())
            .await
            .map_err(|e| ServiceError::Prompt(e.to_string()))?;
        match answer {
            Ok(v) => Ok(v),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted | InquireError::NotTTY) => {
                Ok(None)
            }
            Err(e) => Err(ServiceError::Prompt(e.to_string())),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(p) => {
            let mut cfg = configs::load_from_file(&p.to_string_lossy())?;
            cfg.normalize_and_validate()?;
            Ok(cfg)
        }
        None => AppConfig::load_or_default(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = load_config(cli.config.as_ref())?;
    let registry = runtime::action_registry_from_config(&cfg.actions).await?;
    let store = runtime::start_from_config(&cfg, registry).await?;
    let prompter: Arc<dyn Prompter> = if cli.no_input { Arc::new(NoPrompt) } else { Arc::new(InquirePrompter) };
    let commands = StateCommands::new(Arc::clone(&store), prompter);
    debug!(command = ?cli.command, "running command");

    let outcome = match cli.command {
        Command::Set { key, value } => commands
            .set_state(key, value.as_deref().map(parse_value))
            .await
            .map(|u| {
                println!("State updated: ({}: {}).", u.key, u.value);
                ExitCode::SUCCESS
            }),
        Command::Get { key } => commands.get_state(key).await.map(|v| match v {
            Some(v) => {
                println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()));
                ExitCode::SUCCESS
            }
            None => ExitCode::from(1),
        }),
        Command::RegisterListener { key, callback } => commands.register_listener(key, callback).await.map(|(k, cb)| {
            println!("Listener registered: {cb} on {k}.");
            ExitCode::SUCCESS
        }),
        Command::Listeners { key } => store.listeners(&key).await.map(|list| {
            for cb in list {
                println!("{cb}");
            }
            ExitCode::SUCCESS
        }),
    };
    store.shutdown().await;

    match outcome {
        Ok(code) => Ok(code),
        Err(e @ ServiceError::MissingArgument(_)) => {
            eprintln!("{e}");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    common::utils::logging::init_logging_cli();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
