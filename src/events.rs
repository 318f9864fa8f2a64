//! Event types and the main event loop driver for the health finder TUI.
//!
//! This module defines the [`Event`] enum (keyboard input, ticks, and results
//! of background location lookups) and the [`EventHandler`], which runs a
//! background thread that polls crossterm for key events and emits periodic
//! [`Event::Tick`]s. The main loop in `main.rs` receives events via
//! [`EventHandler::next`]; background lookups spawned by the app send their
//! results through a clone of [`EventHandler::tx`].

use crate::geo::Coordinates;
use crate::location::{LocationError, LocationSource};
use crate::session::SessionToken;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::error;

/// Events processed by the application event loop.
#[derive(Debug)]
pub enum Event {
    /// Periodic tick used for UI refresh (spinner animation).
    Tick,
    /// User key press from the terminal.
    Input(KeyEvent),
    /// A live location lookup for an emergency session finished.
    LocationResolved {
        /// Session activation the lookup was started for.
        token: SessionToken,
        /// Outcome of the lookup.
        source: LocationSource,
    },
    /// A live lookup requested from the settings view finished.
    PinnedLocation(Result<Coordinates, LocationError>),
    /// The terminal can no longer be read; no further input will arrive.
    InputClosed,
}

/// Multiplexes terminal input and ticks into a single event stream.
///
/// Holds an unbounded channel: the sender ([`tx`](EventHandler::tx)) can be
/// cloned and given to background tasks, while the receiver is consumed by
/// [`next`](EventHandler::next) in the main loop.
pub struct EventHandler {
    /// Sender for posting events from background tasks.
    pub tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Creates a new event handler and spawns the input/tick thread.
    ///
    /// The thread polls crossterm with a timeout of `tick_rate_ms`; when a key
    /// is pressed it sends [`Event::Input`], and when the tick interval
    /// elapses it sends [`Event::Tick`]. It exits when the receiver is dropped,
    /// or after sending [`Event::InputClosed`] when the terminal can no longer
    /// be read.
    pub fn new(tick_rate_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();

        std::thread::spawn(move || {
            let tick_rate = Duration::from_millis(tick_rate_ms);
            let mut last_tick = Instant::now();
            loop {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::from_secs(0));
                match event::poll(timeout) {
                    Ok(true) => match event::read() {
                        Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                            if event_tx.send(Event::Input(key)).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Terminal read failed: {}", e);
                            let _ = event_tx.send(Event::InputClosed);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        error!("Terminal poll failed: {}", e);
                        let _ = event_tx.send(Event::InputClosed);
                        break;
                    }
                }
                if last_tick.elapsed() >= tick_rate {
                    if event_tx.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { tx, rx }
    }

    /// Receives the next event from the channel.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
