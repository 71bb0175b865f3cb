//! `ollachat` binary: web server plus terminal helpers for chat and downloads.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nonempty::NonEmpty;
use tracing::info;

use ollachat::config::AppConfig;
use ollachat::logging::init_logging;
use ollachat::model::{ChatMessage, ChatRequest};
use ollachat::relay::{ChatIncrement, PullPhase};
use ollachat::{api, ModelRuntime, OllamaClient};

/// Local chat server and model manager for Ollama.
#[derive(Parser, Debug)]
#[command(name = "ollachat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./ollachat.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ollama base URL.
    #[arg(long, env = "OLLAMA_HOST", global = true)]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Directory offered as project context.
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Send one prompt and stream the answer to stdout. Ctrl-C stops it.
    Chat {
        #[arg(short, long)]
        model: String,

        prompt: String,

        #[arg(short, long)]
        temperature: Option<f32>,
    },

    /// Download a model, printing progress.
    Pull { model: String },

    /// List local models.
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.ollama_url {
        config.upstream.base_url = url;
    }
    init_logging(&config.logging)?;

    let runtime: Arc<dyn ModelRuntime> = Arc::new(OllamaClient::new(config.transport_options())?);

    match cli.command {
        Command::Serve { host, port, project } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(project) = project {
                config.context.project_root = Some(project);
            }
            info!("Starting OllamaChat server...");
            api::serve(config, runtime).await?;
        }
        Command::Chat {
            model,
            prompt,
            temperature,
        } => chat(runtime.as_ref(), &config, model, prompt, temperature).await?,
        Command::Pull { model } => pull(runtime.as_ref(), &model).await?,
        Command::Models => {
            for model in runtime.list_models().await? {
                println!("{}", model.id);
            }
        }
    }

    Ok(())
}

async fn chat(
    runtime: &dyn ModelRuntime,
    config: &AppConfig,
    model: String,
    prompt: String,
    temperature: Option<f32>,
) -> Result<()> {
    let messages = NonEmpty {
        head: ChatMessage::system(config.chat.system_prompt.clone()),
        tail: vec![ChatMessage::user(prompt)],
    };
    let request = ChatRequest::new(model, messages)
        .with_temperature(temperature.unwrap_or(config.chat.default_temperature));

    let mut relay = runtime.chat_stream(&request).await?;
    let cancel = relay.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    while let Some(increment) = relay.next().await {
        match increment {
            ChatIncrement::Delta(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            ChatIncrement::Done { .. } => {
                writeln!(stdout)?;
                break;
            }
            ChatIncrement::Empty => {
                writeln!(stdout, "[empty response]")?;
                break;
            }
            ChatIncrement::Cancelled { .. } => {
                writeln!(stdout, "\n[cancelled]")?;
                break;
            }
            ChatIncrement::Failed { message, .. } => {
                writeln!(stdout)?;
                bail!(message);
            }
        }
    }
    Ok(())
}

async fn pull(runtime: &dyn ModelRuntime, model: &str) -> Result<()> {
    let mut relay = runtime.pull(model).await?;
    let cancel = relay.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(event) = relay.next().await {
        match event.phase {
            PullPhase::Error => bail!(event.message.unwrap_or_else(|| "pull failed".to_string())),
            PullPhase::Cancelled => println!("cancelled at {}%", event.percent),
            _ => println!("{:>3}% {}", event.percent, event.status),
        }
    }
    Ok(())
}
