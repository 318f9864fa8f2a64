use color_eyre::Result;
use healthfinder_tui::{
    app::{App, ViewMode},
    config::Config,
    db::PreferenceDb,
    events::EventHandler,
    location::provider_from_config,
    logging,
    models::FacilityDirectory,
    ui,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Instrumentation and safety
    let _log_guard = logging::initialize_logging();
    color_eyre::install()?;
    install_panic_hook(); // wraps color-eyre's hook, so install it second

    // Load everything that can fail before touching the terminal
    let config = Config::load();
    let directory = Arc::new(FacilityDirectory::load(config.directory.paths.as_slice()));
    info!("Facility directory ready with {} entries", directory.len());
    let prefs = Arc::new(PreferenceDb::open(&config.storage.database)?);
    let provider = provider_from_config(&config.location);

    // Ready terminal and state
    let mut terminal = setup_terminal()?;
    let mut event_handler = EventHandler::new(config.ui.tick_rate_ms);
    let mut app = App::new(
        directory,
        prefs,
        provider,
        event_handler.tx.clone(),
        ViewMode::from_name(&config.ui.default_view),
    );

    // Main loop
    while !app.should_quit {
        terminal.draw(|f| ui::render(f, &app))?;

        match event_handler.next().await {
            Some(event) => app.handle_event(event),
            None => break,
        }
    }

    restore_terminal(terminal)?;
    info!("Exiting");
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen, crossterm::cursor::Hide)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show)?;
    Ok(())
}

fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Force terminal cleanup!
        crossterm::terminal::disable_raw_mode().ok();
        crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show).ok();
        original_hook(panic_info);
    }));
}
