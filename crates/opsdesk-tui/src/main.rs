use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opsdesk_core::session::GATEWAY_APOLOGY;
use opsdesk_core::{
    gateway_from_config, materialize, recover, Assistant, Bindings, ChatReply, Config,
    HttpApiClient, OllamaClient, SchemaContext,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "Chat with the operations assistant and run the components it generates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat interface (default)
    Chat {
        /// User id whose preferences and activity are sent as context
        #[arg(short, long)]
        user: Option<i64>,
    },
    /// Send one message through the pipeline and print the reply
    Ask {
        /// What you need
        message: String,
        #[arg(short, long)]
        user: Option<i64>,
        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the recovery cascade on a saved model reply
    Recover {
        file: PathBuf,
    },
    /// Print the schema document sent to the model
    Schema,
    /// Materialize a component file and print what it renders
    Check {
        file: PathBuf,
    },
    /// List models installed on the Ollama server
    Models,
}

/// The TUI owns the terminal, so its logs go to a file.
fn init_file_logging() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Could not find data directory")?
        .join("opsdesk");
    fs::create_dir_all(&dir)?;
    let path = dir.join("opsdesk.log");
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_assistant(config: &Config) -> Result<(Assistant, Bindings)> {
    let gateway = gateway_from_config(config)?;
    let api = Arc::new(HttpApiClient::new(&config.api_base_url(), Handle::current()));
    info!(
        provider = gateway.provider().as_str(),
        model = gateway.model(),
        api = api.base_url(),
        "Pipeline configured"
    );
    let assistant = Assistant::new(gateway, SchemaContext::from_config(config))
        .with_context_source(api.clone());
    let bindings = Bindings::new(api).with_max_operations(config.max_operations());
    Ok((assistant, bindings))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Chat { user: None });
    if matches!(command, Commands::Chat { .. }) {
        let log_path = init_file_logging()?;
        info!(log = %log_path.display(), "Starting opsdesk");
    } else {
        init_stderr_logging();
    }
    let config = Config::load()?;

    match command {
        Commands::Chat { user } => run_tui(&config, user.or(config.user_id)).await?,
        Commands::Ask { message, user, json } => {
            ask(&config, &message, user.or(config.user_id), json).await?
        }
        Commands::Recover { file } => recover_file(&file)?,
        Commands::Schema => {
            println!("{}", SchemaContext::from_config(&config).to_pretty());
        }
        Commands::Check { file } => check_file(&config, &file)?,
        Commands::Models => list_ollama_models(&config).await?,
    }

    Ok(())
}

async fn run_tui(config: &Config, user_id: Option<i64>) -> Result<()> {
    let (assistant, bindings) = build_assistant(config)?;
    let mut app = App::new(Arc::new(assistant), bindings, user_id);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            let Some(event) = events.next().await else {
                break;
            };
            handler::handle_event(&mut app, event).await?;
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(config: &Config, message: &str, user_id: Option<i64>, json: bool) -> Result<()> {
    let (assistant, _) = build_assistant(config)?;
    let gateway = assistant.gateway();

    if !json {
        println!(
            "🤖 Asking {} ({})...\n",
            gateway.model().bold().magenta(),
            gateway.provider().display_name()
        );
    }

    let reply = match assistant.respond(message, user_id).await {
        Ok(reply) => reply,
        Err(e) => {
            println!("{}", GATEWAY_APOLOGY.red());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reply.to_wire())?);
        return Ok(());
    }

    match &reply {
        ChatReply::Component {
            envelope, strategy, ..
        } => {
            println!(
                "{} {}",
                "Component:".bold().green(),
                envelope.title.as_deref().unwrap_or("Generated Component").bold()
            );
            println!("{} {}", "Recovered via:".dimmed(), strategy);
            if let Some(explanation) = &envelope.explanation {
                println!("\n{}", explanation);
            }
            println!("\n{}", "=".repeat(50).dimmed());
            println!("{}", envelope.code);
            println!("{}", "=".repeat(50).dimmed());
        }
        ChatReply::Text {
            content,
            parse_failed,
            ..
        } => {
            if *parse_failed {
                println!("{}", "The reply was not a component.".yellow());
            }
            println!("{}", content);
        }
    }
    Ok(())
}

fn recover_file(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match recover(&raw) {
        Ok(recovered) => {
            println!(
                "{} {}",
                "Recovered via:".bold().green(),
                recovered.strategy.to_string().bold()
            );
            println!("{}", serde_json::to_string_pretty(&recovered.envelope)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}: {}", "Recovery failed".red(), failure);
            println!("{}", failure.excerpt.dimmed());
            Err(failure.into())
        }
    }
}

fn check_file(config: &Config, path: &Path) -> Result<()> {
    let code = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let api = Arc::new(HttpApiClient::new(&config.api_base_url(), Handle::current()));
    let bindings = Bindings::new(api).with_max_operations(config.max_operations());

    let rendered = materialize(&code, &bindings).and_then(|mut component| {
        let tree = component.render()?;
        Ok((component, tree))
    });

    match rendered {
        Ok((mut component, tree)) => {
            println!("{} {}", "Rendered".bold().green(), component.name().bold());
            println!("{}", "=".repeat(50).dimmed());
            println!("{}", tree.plain_text());
            for alert in component.take_alerts() {
                println!("{} {}", "alert:".yellow(), alert);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}: {}", "Error rendering component".red(), e);
            Err(e.into())
        }
    }
}

async fn list_ollama_models(config: &Config) -> Result<()> {
    let url = config.ollama_url();
    let ollama = OllamaClient::new(&url);

    println!("\n{}", "🤖 Available Ollama Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    match ollama.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("{}", "No models found. Pull one with: ollama pull qwen2.5-coder".yellow());
        }
        Ok(models) => {
            for model in models {
                println!("  • {}", model.green());
            }
        }
        Err(e) => {
            println!("{}: {}", "Error connecting to Ollama".red(), e);
            println!("Make sure Ollama is running at {}", url.bold());
        }
    }
    Ok(())
}
