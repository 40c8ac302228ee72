use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ratatui::crossterm::event;
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vansh_client::{ApiClient, Config, Overrides, SessionContext, SessionStore};
use vansh_core::ConflictPolicy;

mod action;
mod app;
mod backend;
mod input;
mod model;
mod theme;
mod tui_event;
mod view;

use app::App;
use backend::Backend;

/// VANSH terminal shell: capture a life story, watch it become chapters,
/// curate them and publish the book.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Backend origin (default http://localhost:5000)
    #[arg(long)]
    api_url: Option<String>,

    /// Push channel origin, when it differs from the API
    #[arg(long)]
    push_url: Option<String>,

    /// Where the signed-in session is stored
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// How refreshes interact with unsaved local edits
    #[arg(long)]
    conflict_policy: Option<ConflictPolicy>,

    /// Log file (the terminal is taken by the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Default directory for downloaded books
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Do not draft chapters automatically after a transcript is ready
    #[arg(long)]
    no_auto_draft: bool,
}

fn init_logging(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let path = path.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("vansh")
            .join("vansh-tui.log")
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let log_path = init_logging(args.log_file.clone())?;

    // Resolve config from CLI flags > env vars > config file > defaults
    let config = Config::load(Overrides {
        api_url: args.api_url,
        push_url: args.push_url,
        session_file: args.session_file,
        config_file: args.config,
        conflict_policy: args.conflict_policy,
    })?;
    tracing::info!(api = %config.api_url, log = %log_path.display(), "starting vansh-tui");

    let session = SessionContext::hydrate(SessionStore::new(config.session_file.clone()));
    let user = session.user();
    let api = ApiClient::new(&config, session)?;

    let download_dir = args
        .download_dir
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Install panic hook that restores terminal before printing panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Drain any stray input events (e.g. Enter keypress from launching the command)
    while event::poll(Duration::from_millis(50)).unwrap_or(false) {
        let _ = event::read();
    }

    let mut app = App::new(user, config.conflict_policy, download_dir);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let worker = Backend::new(api, config, event_tx, cancel.clone(), !args.no_auto_draft);
    let worker_task = tokio::spawn(worker.run(request_rx));

    // Also handle Ctrl+C at the OS level for clean shutdown
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    // Main event loop
    let tick_rate = Duration::from_millis(100);

    loop {
        for request in app.take_requests() {
            let _ = request_tx.send(request);
        }

        terminal.draw(|f| app.view(f))?;

        let typing = app.is_typing();
        tokio::select! {
            _ = cancel.cancelled() => {
                app.update(action::Action::Quit);
            }
            // Backend events (non-blocking drain)
            maybe_event = event_rx.recv() => {
                if let Some(backend_event) = maybe_event {
                    app.handle_backend_event(backend_event);
                    while let Ok(evt) = event_rx.try_recv() {
                        app.handle_backend_event(evt);
                    }
                }
            }
            // Terminal input events
            _ = async {
                if event::poll(tick_rate).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        app.update(input::map_event(&evt, typing));
                    }
                }
            } => {}
        }

        app.update(action::Action::Tick);

        if app.should_quit {
            cancel.cancel();
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    drop(request_tx);
    let _ = tokio::time::timeout(Duration::from_secs(2), worker_task).await;
    tracing::info!("vansh-tui stopped");
    Ok(())
}
