//! TUI rendering for the health finder
//!
//! This module handles all UI rendering logic using the `ratatui` crate:
//! the facility dashboard, the saved-location settings view, and the modal
//! emergency dialog drawn on top of either.

use crate::app::{App, ViewMode};
use crate::geo::haversine_km;
use crate::matcher::MatchTier;
use crate::models::EmergencyCategory;
use crate::session::{DialogSnapshot, FixOrigin};
use ratatui::{prelude::*, widgets::*};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Renders one frame of the TUI based on current application state.
///
/// Draws the active view, then the emergency dialog over it when a session
/// is open.
///
/// # Arguments
///
/// * `f` - The ratatui frame to draw into (from `terminal.draw()`).
/// * `app` - Current application state.
pub fn render(f: &mut Frame, app: &App) {
    match app.view_mode {
        ViewMode::Dashboard => render_dashboard_view(f, app),
        ViewMode::Settings => render_settings_view(f, app),
    }

    let snapshot = app.session.snapshot();
    if snapshot.dialog_open {
        render_emergency_dialog(f, app, &snapshot);
    }
}

/// Dashboard view: facility list sidebar (35%) + details (65%) + help line.
fn render_dashboard_view(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(f.size());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    // Sidebar
    let items: Vec<ListItem> = app
        .directory
        .facilities()
        .iter()
        .map(|fac| {
            let mapped = if fac.valid_coordinates().is_some() { " " } else { "?" };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} {}", mapped, fac.name)),
                Span::styled(
                    format!(" │ {}", fac.kind.label()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" Facilities ({}) ", app.directory.len()))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .bg(Color::Rgb(30, 30, 60))
                .add_modifier(Modifier::BOLD),
        );
    let mut state = ListState::default();
    if !app.directory.is_empty() {
        state.select(Some(app.selected_index));
    }
    f.render_stateful_widget(list, chunks[0], &mut state);

    // Details
    let details = match app.directory.facilities().get(app.selected_index) {
        Some(fac) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    fac.name.as_str(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    fac.address.as_str(),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(""),
                field_line("Type", fac.kind.label().to_string()),
                field_line("Phone", fac.phone.clone().unwrap_or_else(|| "—".to_string())),
                field_line(
                    "Hours",
                    fac.opening_hours.clone().unwrap_or_else(|| "—".to_string()),
                ),
                field_line("Services", fac.services.join(", ")),
            ];
            match (fac.valid_coordinates(), &app.saved_location) {
                (Some(coords), Some(saved)) => lines.push(field_line(
                    "From saved location",
                    format!("{:.1} km", haversine_km(saved.coordinates, coords)),
                )),
                (None, _) => lines.push(Line::from(Span::styled(
                    "No map position on record",
                    Style::default().fg(Color::Yellow),
                ))),
                _ => {}
            }
            lines
        }
        None => vec![Line::from("No facilities loaded. Check [directory] paths in config.toml.")],
    };
    let panel = Paragraph::new(details).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(" Details ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );
    f.render_widget(panel, chunks[1]);

    render_help(f, rows[1], " ↑/↓ select   e EMERGENCY   s settings   q quit");
}

/// Settings view: the saved emergency location and how to change it.
fn render_settings_view(f: &mut Frame, app: &App) {
    let area = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    let title = Paragraph::new(" Settings ")
        .style(Style::default().add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let body = match &app.saved_location {
        Some(saved) => vec![
            field_line("Saved location", saved.coordinates.to_string()),
            field_line(
                "Address",
                saved.address.clone().unwrap_or_else(|| "—".to_string()),
            ),
            field_line(
                "Saved at",
                saved
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "—".to_string()),
            ),
            Line::from(""),
            Line::from(Span::styled(
                "Emergencies use this location instead of a live lookup.",
                Style::default().fg(Color::DarkGray),
            )),
        ],
        None => vec![
            field_line("Saved location", "none".to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Emergencies will look up your live location.",
                Style::default().fg(Color::DarkGray),
            )),
        ],
    };
    let panel = Paragraph::new(body).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(" Emergency location ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );
    f.render_widget(panel, chunks[1]);

    if let Some(ref msg) = app.settings_message {
        let p = Paragraph::new(msg.as_str())
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(p, chunks[2]);
    }

    render_help(
        f,
        chunks[3],
        " p pin current location   c clear   e EMERGENCY   q back",
    );
}

fn render_emergency_dialog(f: &mut Frame, app: &App, snap: &DialogSnapshot) {
    let area = centered_rect(60, 70, f.size());
    f.render_widget(Clear, area);

    let (title, mut lines) = if !snap.confirmed {
        (
            "Emergency Assistance".to_string(),
            category_prompt(),
        )
    } else if snap.location_loading {
        let spin = SPINNER[app.tick_count % SPINNER.len()];
        (
            "Finding Help...".to_string(),
            vec![
                Line::from(""),
                Line::from(format!("{} Acquiring your location...", spin)).alignment(Alignment::Center),
            ],
        )
    } else if let Some(err) = &snap.location_error {
        (
            "Location Error".to_string(),
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    format!("Could not get your location: {}.", err),
                    Style::default().fg(Color::Red),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enable location access or pin a location in Settings, then try again.",
                    Style::default().fg(Color::DarkGray),
                )),
            ],
        )
    } else if let Some(m) = snap.matched() {
        let fac = &m.facility;
        let mut lines = vec![
            Line::from(Span::styled(fac.address.as_str(), Style::default().fg(Color::DarkGray))),
            Line::from(""),
            field_line("Type", fac.kind.label().to_string()),
            field_line("Distance", format!("{:.1} km", m.distance_km)),
        ];
        if let Some(phone) = &fac.phone {
            lines.push(field_line("Phone", phone.clone()));
        }
        lines.push(field_line("Services", fac.services.join(", ")));
        if let Some(hours) = &fac.opening_hours {
            lines.push(field_line("Hours", hours.clone()));
        }
        if m.tier == MatchTier::AnyFacility {
            let service = snap
                .category
                .map(EmergencyCategory::required_service)
                .unwrap_or("the required service");
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("No facility lists \"{}\"; this is the nearest facility of any type.", service),
                Style::default().fg(Color::Yellow),
            )));
        }
        (format!("Nearest Facility: {}", fac.name), lines)
    } else {
        (
            "No Facilities Found".to_string(),
            vec![
                Line::from(""),
                Line::from("No suitable healthcare facilities found nearby based on your location and our directory."),
                Line::from(""),
                Line::from(Span::styled(
                    "Contact emergency services directly if this is a critical situation.",
                    Style::default().fg(Color::Red),
                )),
            ],
        )
    };

    if let Some((coords, origin)) = snap.location {
        let origin = match origin {
            FixOrigin::PersistedDefault => "saved location",
            FixOrigin::LiveDevice => "live location",
        };
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Searched from your {} {}", origin, coords),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let footer = if !snap.confirmed {
        "1/2/3 choose   Esc cancel".to_string()
    } else if snap.location_loading {
        "Esc cancel".to_string()
    } else {
        match snap.matched_facility().and_then(|fac| fac.phone.as_deref()) {
            Some(phone) => format!("Call facility: {}   Enter/Esc close", phone),
            None => "Enter/Esc close".to_string(),
        }
    };

    let stamp = snap
        .opened_at
        .map(|t| format!(" · {}", t.format("%H:%M")))
        .unwrap_or_default();

    let dialog = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(format!(" {}{} ", title, stamp))
            .title(block::Title::from(format!(" {} ", footer)).position(block::Position::Bottom))
            .borders(Borders::ALL)
            .border_type(BorderType::Thick)
            .border_style(Style::default().fg(Color::Red)),
    );
    f.render_widget(dialog, area);
}

fn category_prompt() -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from("For immediate life-threatening situations, call 112 directly."),
        Line::from("For other urgent needs, choose your emergency:"),
        Line::from(""),
    ];
    for (i, category) in EmergencyCategory::ALL.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(
                format!("  [{}] ", i + 1),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(category.label()),
        ]));
    }
    lines
}

fn field_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{}: ", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_help(f: &mut Frame, area: Rect, text: &str) {
    let help = Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
