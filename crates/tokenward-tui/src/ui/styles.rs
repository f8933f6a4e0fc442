//! Palette for the tokenward screens.

use ratatui::style::{Color, Modifier, Style};

const BRAND: Color = Color::Rgb(80, 150, 170);
const OK: Color = Color::Rgb(110, 170, 110);
const ATTENTION: Color = Color::Rgb(210, 170, 80);
const DANGER: Color = Color::Rgb(200, 80, 70);
const DIM: Color = Color::DarkGray;
const FIELD_BG: Color = Color::Rgb(40, 50, 60);
const BAR_BG: Color = Color::Rgb(24, 28, 34);

/// Seconds left at which the countdown switches to the danger color.
const COUNTDOWN_URGENT_SECS: u64 = 10;

fn fg(color: Color) -> Style {
    Style::default().fg(color)
}

pub fn title_style() -> Style {
    fg(BRAND).add_modifier(Modifier::BOLD)
}

/// Input fields and the submit button; the focused one is filled.
pub fn field_style(focused: bool) -> Style {
    if focused {
        Style::default().bg(FIELD_BG).fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        fg(Color::Gray)
    }
}

pub fn muted_style() -> Style {
    fg(DIM)
}

pub fn highlight_style() -> Style {
    fg(ATTENTION)
}

pub fn success_style() -> Style {
    fg(OK)
}

pub fn error_style() -> Style {
    fg(DANGER)
}

pub fn countdown_style(seconds: u64) -> Style {
    let color = if seconds <= COUNTDOWN_URGENT_SECS { DANGER } else { ATTENTION };
    fg(color).add_modifier(Modifier::BOLD)
}

pub fn status_bar_style() -> Style {
    Style::default().bg(BAR_BG).fg(Color::Gray)
}

pub fn help_key_style() -> Style {
    fg(ATTENTION).add_modifier(Modifier::BOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_turns_urgent() {
        assert_eq!(countdown_style(11).fg, Some(ATTENTION));
        assert_eq!(countdown_style(10).fg, Some(DANGER));
        assert_eq!(countdown_style(0).fg, Some(DANGER));
    }
}
