mod action;
mod app;
mod cache;
mod config;
mod draft;
mod editor;
mod error;
mod pagination;
mod rest;
mod search;
mod service;
mod token;
mod tui;
mod types;
mod ui;

use std::fs::File;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::{App, ListSettings};
use crate::cache::QueryCache;
use crate::config::Config;
use crate::rest::RestClient;
use crate::search::{Location, Navigator};
use crate::service::RecordService;
use crate::tui::{EventHandler, Tui};

const TICK_RATE: Duration = Duration::from_millis(250);
const RENDER_RATE: Duration = Duration::from_millis(16); // ~60fps

#[derive(Debug, Parser)]
#[command(version, about = "Administer users, items and meetings from the terminal")]
struct Cli {
    /// View to open, optionally with search state, e.g. `meetings?page=2`
    location: Option<String>,

    /// Config file (default: ~/.config/roster/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend root URL, overrides api.base_url
    #[arg(long)]
    base_url: Option<String>,

    /// Rows per page, overrides view.page_size
    #[arg(long)]
    page_size: Option<u32>,

    /// Write logs here; RUST_LOG selects the level
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match log_file {
        Some(path) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(File::create(path)?)),
            )
            .init(),
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(page_size) = cli.page_size {
        config.view.page_size = page_size;
    }
    let start = cli.location.as_deref().map(Location::parse).transpose()?;

    let token = token::load_token(&config.api)?;
    let service: Arc<dyn RecordService> = Arc::new(RestClient::new(
        &config.api.base_url,
        &config.api.prefix,
        token,
        config.api.timeout(),
    )?);
    info!(backend = service.name(), page_size = config.view.page_size(), "starting");

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let mut terminal = tui::init()?;
    let result = run(&mut terminal, service, &config, start).await;
    tui::restore()?;

    result
}

async fn run(
    terminal: &mut Tui,
    service: Arc<dyn RecordService>,
    config: &Config,
    start: Option<Location>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let cache = QueryCache::new(config.view.stale_time());
    let settings = ListSettings {
        page_size: config.view.page_size(),
        exact_next_page: config.view.exact_next_page,
    };
    let mut app = App::new(
        service,
        cache,
        settings,
        Navigator::new(start),
        action_tx.clone(),
    );

    let mut events = EventHandler::new(TICK_RATE, RENDER_RATE, true);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_quit() {
                    break;
                }

                match event {
                    tui::Event::Render => {
                        terminal.draw(|frame| ui::render(frame, &app))?;
                    }
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                match action {
                    Action::SuspendForEditor(ctx) => {
                        // the event task would otherwise read the editor's keystrokes
                        drop(events);
                        let program = editor::detect_editor();
                        let edited = tui::suspend(terminal, || editor::edit(&ctx.initial, &program))?;
                        events = EventHandler::new(TICK_RATE, RENDER_RATE, false);
                        let action = match edited {
                            Ok(text) => Action::EditorClosed { ctx, text },
                            Err(e) => Action::Error(format!("Cannot run {}: {}", program, e)),
                        };
                        app.update(action);
                    }
                    action => app.update(action),
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
