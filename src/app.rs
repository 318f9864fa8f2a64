use crate::db::{PreferenceDb, SavedLocation};
use crate::events::Event;
use crate::geo::Coordinates;
use crate::location::{GeolocationProvider, LocationError, LocationResolver, Resolution};
use crate::models::{EmergencyCategory, FacilityDirectory};
use crate::session::EmergencySession;
use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub enum ViewMode {
    #[default]
    Dashboard,
    Settings,
}

impl ViewMode {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("settings") {
            ViewMode::Settings
        } else {
            ViewMode::Dashboard
        }
    }
}

pub struct App {
    pub view_mode: ViewMode,
    pub directory: Arc<FacilityDirectory>,
    pub selected_index: usize,
    pub tick_count: usize,
    pub should_quit: bool,

    // Emergency flow
    pub session: EmergencySession,
    resolver: LocationResolver,
    pending_lookup: Option<JoinHandle<()>>,

    // Saved default location (settings view)
    prefs: Arc<PreferenceDb>,
    pub saved_location: Option<SavedLocation>,
    pub settings_message: Option<String>,
    pending_pin: Option<JoinHandle<()>>,

    tx: UnboundedSender<Event>,
}

impl App {
    pub fn new(
        directory: Arc<FacilityDirectory>,
        prefs: Arc<PreferenceDb>,
        provider: Arc<dyn GeolocationProvider>,
        tx: UnboundedSender<Event>,
        view_mode: ViewMode,
    ) -> Self {
        let resolver = LocationResolver::new(prefs.clone(), provider);
        let saved_location = prefs.saved_location_details();
        Self {
            view_mode,
            directory,
            selected_index: 0,
            tick_count: 0,
            should_quit: false,
            session: EmergencySession::new(),
            resolver,
            pending_lookup: None,
            prefs,
            saved_location,
            settings_message: None,
            pending_pin: None,
            tx,
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Tick => self.on_tick(),
            Event::Input(key) => self.handle_key(key),
            Event::LocationResolved { token, source } => {
                if self
                    .session
                    .complete_location(token, source, self.directory.facilities())
                {
                    self.pending_lookup = None;
                }
            }
            Event::PinnedLocation(result) => self.on_pinned_location(result),
            Event::InputClosed => {
                warn!("Terminal input closed; shutting down");
                self.abort_lookup();
                if let Some(pin) = self.pending_pin.take() {
                    pin.abort();
                }
                self.should_quit = true;
            }
        }
    }

    pub fn on_tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        // The dialog is modal
        if self.session.is_open() {
            self.handle_dialog_key(key);
            return;
        }

        match self.view_mode {
            ViewMode::Dashboard => self.handle_dashboard_key(key),
            ViewMode::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        let count = self.directory.len();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('e') | KeyCode::Char('!') => self.open_emergency(),
            KeyCode::Char('s') | KeyCode::Char('2') => self.view_mode = ViewMode::Settings,
            KeyCode::Down | KeyCode::Char('j') => {
                if count > 0 {
                    self.selected_index = (self.selected_index + 1) % count;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if count > 0 {
                    self.selected_index = self.selected_index.checked_sub(1).unwrap_or(count - 1);
                }
            }
            _ => {}
        }
    }

    fn handle_settings_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Char('1') => {
                self.view_mode = ViewMode::Dashboard
            }
            KeyCode::Char('e') | KeyCode::Char('!') => self.open_emergency(),
            KeyCode::Char('p') => self.pin_live_location(),
            KeyCode::Char('c') => self.clear_saved_location(),
            _ => {}
        }
    }

    fn handle_dialog_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.close_emergency(),
            KeyCode::Enter if !self.session.snapshot().location_loading => {
                if self.session.snapshot().confirmed {
                    self.close_emergency();
                }
            }
            KeyCode::Char('1') => self.select_category(EmergencyCategory::Accident),
            KeyCode::Char('2') => self.select_category(EmergencyCategory::Maternity),
            KeyCode::Char('3') => self.select_category(EmergencyCategory::GeneralMedical),
            _ => {}
        }
    }

    pub fn open_emergency(&mut self) {
        self.abort_lookup();
        self.session.open();
    }

    pub fn close_emergency(&mut self) {
        self.abort_lookup();
        self.session.close();
    }

    /// Starts location resolution for the chosen category.
    ///
    /// A saved location resolves and matches inside this call, so the dialog
    /// never shows a loading frame for it. Live lookups run on a task that
    /// reports back through [`Event::LocationResolved`].
    pub fn select_category(&mut self, category: EmergencyCategory) {
        let Some(token) = self.session.select_category(category) else {
            return;
        };

        match self.resolver.begin() {
            Resolution::Ready(source) => {
                self.session
                    .complete_location(token, source, self.directory.facilities());
            }
            Resolution::Pending(lookup) => {
                let tx = self.tx.clone();
                self.pending_lookup = Some(tokio::spawn(async move {
                    let source = lookup.await;
                    let _ = tx.send(Event::LocationResolved { token, source });
                }));
            }
        }
    }

    fn abort_lookup(&mut self) {
        if let Some(handle) = self.pending_lookup.take() {
            handle.abort();
        }
    }

    fn pin_live_location(&mut self) {
        if self.pending_pin.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.settings_message = Some("Looking up your current location...".to_string());
        let provider = self.resolver.provider();
        let tx = self.tx.clone();
        self.pending_pin = Some(tokio::spawn(async move {
            let result = provider.current_position().await;
            let _ = tx.send(Event::PinnedLocation(result));
        }));
    }

    fn on_pinned_location(&mut self, result: Result<Coordinates, LocationError>) {
        self.pending_pin = None;
        let coords = match result {
            Ok(coords) => coords,
            Err(e) => {
                self.settings_message = Some(format!("Could not get your location: {}", e));
                return;
            }
        };
        let label = format!("Current location {}", coords);
        match self.prefs.save_location(coords, Some(&label)) {
            Ok(()) => {
                self.saved_location = self.prefs.saved_location_details();
                self.settings_message = Some(format!("Saved {} as your emergency location", coords));
            }
            Err(e) => {
                error!("Failed to save default location: {}", e);
                self.settings_message = Some(format!("Could not save location: {}", e));
            }
        }
    }

    fn clear_saved_location(&mut self) {
        match self.prefs.clear_saved_location() {
            Ok(()) => {
                self.saved_location = None;
                self.settings_message = Some("Saved location cleared".to_string());
                info!("Saved location cleared from settings");
            }
            Err(e) => {
                error!("Failed to clear default location: {}", e);
                self.settings_message = Some(format!("Could not clear location: {}", e));
            }
        }
    }
}
