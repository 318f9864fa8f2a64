//! Health finder: locate the nearest suitable medical facility in an emergency.
//!
//! The emergency flow is [`session::EmergencySession`], which drives
//! [`location::LocationResolver`] and [`matcher::find_nearest`]. The rest of
//! the crate is the terminal front end around it.

pub mod app;
pub mod config;
pub mod db;
pub mod events;
pub mod geo;
pub mod location;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod session;
pub mod ui;
