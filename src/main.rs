use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use raglab::app::App;
use raglab::session::ERROR_PREFIX;
use raglab::tui::{self, EventHandler, Tui};
use raglab::{handler, logging, ui, Config, QuerySession, RagClient};

#[derive(Parser)]
#[command(name = "raglab", version)]
#[command(about = "Chat with a local retrieval-augmented question-answering backend")]
struct Cli {
    /// Backend base URL (default http://localhost:8002)
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Directory for exported history files
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat screen (default)
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing().context("Could not initialize logging")?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = cli.backend_url {
        config.backend_url = Some(url);
    }
    if let Some(dir) = cli.export_dir {
        config.export_dir = Some(dir);
    }

    let client = RagClient::new(config.backend_url(), config.request_timeout())?;
    info!(target: "raglab", backend = client.base_url(), "Starting");
    let session = QuerySession::new(Arc::new(client));

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let mut app = App::new(session, config.backend_url().to_string(), config.export_dir());
            run_tui(&mut app).await
        }
        Commands::Ask { query } => {
            let mut session = session;
            if !ask_once(&mut session, &query).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_tui(app: &mut App) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = event_loop(&mut terminal, app, &mut events).await;
    tui::restore()?;
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event),
                None => break,
            },
            _ = app.session.settle() => {}
        }
    }

    // Don't leave a request running behind a closed screen
    app.stop();
    Ok(())
}

/// Run one query to completion. Ctrl+C cancels it. Returns false on failure.
async fn ask_once(session: &mut QuerySession, query: &str) -> Result<bool> {
    if !session.submit(query) {
        bail!("Query is empty");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;

    loop {
        tokio::select! {
            _ = session.settle() => break,
            res = &mut ctrl_c, if !cancel_sent => {
                res?;
                session.cancel();
                cancel_sent = true;
            }
        }
    }

    let reply = session
        .transcript()
        .last()
        .context("No reply recorded")?;

    println!("{}", reply.content());
    if let Some(context) = reply.context() {
        println!("\nSources: {}", context);
    }

    Ok(!reply.content().starts_with(ERROR_PREFIX))
}
