use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{format_countdown, App, AppState, LoginFocus, LoginMode};

use super::styles;

const LOGO: [&str; 3] = [
    "  ╔╦╗╔═╗╦╔═╔═╗╔╗╔╦ ╦╔═╗╦═╗╔╦╗",
    "   ║ ║ ║╠╩╗║╣ ║║║║║║╠═╣╠╦╝ ║║",
    "   ╩ ╚═╝╩ ╩╚═╝╝╚╝╚╩╝╩ ╩╩╚══╩╝",
];

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(8),    // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_main_content(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    // Render overlays
    match app.state {
        AppState::LoggingIn => render_login_overlay(frame, app),
        AppState::Warning => render_warning_overlay(frame, app),
        AppState::ConfirmingQuit => render_quit_overlay(frame),
        AppState::Normal | AppState::Quitting => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  tokenward";
    let who = app
        .session
        .account()
        .map(|a| a.display_name().to_string())
        .or_else(|| app.profile.as_ref().map(|p| p.full_name()))
        .unwrap_or_default();

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.len() + who.chars().count() + 2),
        )),
        Span::styled(who, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Profile ")
        .borders(Borders::ALL)
        .border_style(styles::muted_style());

    let lines = match &app.profile {
        Some(profile) => {
            let mut lines = vec![
                field_line("Name", &profile.full_name()),
                field_line("Username", &profile.username),
                field_line("Email", &profile.email),
            ];
            if let Some(count) = profile.login_count {
                lines.push(field_line("Logins", &count.to_string()));
            }
            if let Some(ref last) = profile.last_activity {
                lines.push(field_line("Last active", last));
            }
            lines
        }
        None if app.profile_loading => {
            vec![Line::from(Span::styled("  Loading profile...", styles::muted_style()))]
        }
        None => vec![Line::from(Span::styled("  No profile loaded", styles::muted_style()))],
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn field_line<'a>(label: &'a str, value: &str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {:<12}", label), styles::muted_style()),
        Span::raw(value.to_string()),
    ])
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = match app.state {
        AppState::LoggingIn => "[Tab] next | [F2] sign in/register | [Esc] quit",
        _ => "[r]eload | [l]ogout | [q]uit",
    };

    let (left_text, left_style) = if let Some(ref msg) = app.status_message {
        (format!(" {} ", msg), styles::error_style())
    } else if app.state == AppState::LoggingIn {
        (" Logged out ".to_string(), styles::muted_style())
    } else {
        (" Session active ".to_string(), styles::success_style())
    };
    let right_text = format!(" {} ", shortcuts);

    let padding_len = (area.width as usize)
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, left_style),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(Paragraph::new(status_line).style(styles::status_bar_style()), area);
}

fn logo_lines() -> Vec<Line<'static>> {
    LOGO.iter()
        .map(|l| Line::from(Span::styled(*l, styles::title_style())))
        .collect()
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let registering = app.login_mode == LoginMode::Register;
    let mut height = 12;
    if registering {
        height += 1;
    }
    if app.notice.is_some() {
        height += 2;
    }
    if app.login_error.is_some() {
        height += 2;
    }
    let area = centered_rect_fixed(50, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = logo_lines();
    lines.push(Line::from(""));

    if let Some(ref notice) = app.notice {
        lines.push(Line::from(Span::styled(format!("  {}", notice), styles::highlight_style())));
        lines.push(Line::from(""));
    }

    if registering {
        lines.push(input_line(app, LoginFocus::Name, "Name:    ", &app.login_name));
    }
    lines.push(input_line(app, LoginFocus::Email, "Email:   ", &app.login_email));
    let masked = "*".repeat(app.login_password.chars().count());
    lines.push(input_line(app, LoginFocus::Password, "Password:", &masked));
    lines.push(Line::from(""));

    let label = if registering { "[ Create account ]" } else { "[ Login ]" };
    lines.push(Line::from(vec![
        Span::raw("                "),
        Span::styled(label, styles::field_style(app.login_focus == LoginFocus::Button)),
    ]));

    if let Some(ref err) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!("  {}", err), styles::error_style())));
    }

    let title = if registering { " Register " } else { " Login " };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(styles::title_style());

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn input_line<'a>(app: &App, focus: LoginFocus, label: &'a str, value: &str) -> Line<'a> {
    let focused = app.login_focus == focus;
    let cursor = if focused { "▌" } else { "" };
    Line::from(vec![
        Span::raw("  "),
        Span::styled(label, styles::muted_style()),
        Span::styled(" [", styles::muted_style()),
        Span::styled(format!("{:<28}{}", value, cursor), styles::field_style(focused)),
        Span::styled("]", styles::muted_style()),
    ])
}

fn render_warning_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(50, 10, frame.area());
    frame.render_widget(Clear, area);

    let seconds = app.seconds_remaining().unwrap_or(0);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  You will be logged out due to inactivity in",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::raw("                     "),
            Span::styled(format_countdown(seconds), styles::countdown_style(seconds)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to stay logged in, ", styles::muted_style()),
            Span::styled("[L]", styles::help_key_style()),
            Span::styled(" to log out", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .title(" Session expiring ")
        .borders(Borders::ALL)
        .border_style(styles::error_style());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Create a centered rect with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(50, 9, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = logo_lines();
    lines.extend([
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::title_style());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
