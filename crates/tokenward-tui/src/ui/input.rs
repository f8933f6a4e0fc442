//! Keyboard input handling for the TUI.
//!
//! Key presses change application state here. Separately, every terminal
//! event that counts as user activity is mapped to an `InputSignal` for the
//! session's inactivity clock.

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, MouseEventKind};
use tokenward_core::InputSignal;

use crate::app::{can_add_char, App, AppState, LoginFocus};

/// Map a terminal event to the input signal it represents, if any.
pub fn signal_for(event: &Event) -> Option<InputSignal> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => Some(InputSignal::KeyPress),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => Some(InputSignal::PointerMove),
            MouseEventKind::Down(_) => Some(InputSignal::Click),
            MouseEventKind::ScrollUp
            | MouseEventKind::ScrollDown
            | MouseEventKind::ScrollLeft
            | MouseEventKind::ScrollRight => Some(InputSignal::Scroll),
            MouseEventKind::Up(_) => None,
        },
        Event::Resize(_, _) => Some(InputSignal::Resize),
        Event::FocusGained => Some(InputSignal::FocusGained),
        _ => None,
    }
}

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.kind == KeyEventKind::Release {
        return Ok(false);
    }

    match app.state {
        AppState::LoggingIn => handle_login_input(app, key).await,
        AppState::Warning => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.confirm_stay(),
                KeyCode::Char('l') | KeyCode::Char('L') => app.logout(),
                _ => {}
            }
            Ok(false)
        }
        AppState::ConfirmingQuit => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    app.state = AppState::Quitting;
                    return Ok(true);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            Ok(false)
        }
        AppState::Normal => {
            match key.code {
                KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
                KeyCode::Char('l') => app.logout(),
                KeyCode::Char('r') => app.fetch_profile_background(),
                _ => {}
            }
            Ok(false)
        }
        AppState::Quitting => Ok(true),
    }
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Quit if on login screen
            app.state = AppState::Quitting;
            return Ok(true);
        }
        KeyCode::F(2) => app.toggle_login_mode(),
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = app.login_focus.next(app.login_mode);
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = app.login_focus.prev(app.login_mode);
        }
        KeyCode::Enter => {
            if app.login_focus == LoginFocus::Button {
                app.attempt_login().await;
            } else {
                app.login_focus = app.login_focus.next(app.login_mode);
            }
        }
        KeyCode::Backspace => {
            if let Some(field) = focused_field(app) {
                field.pop();
            }
        }
        KeyCode::Char(c) => {
            let focus = app.login_focus;
            if let Some(field) = focused_field(app) {
                if can_add_char(focus, field.chars().count(), c) {
                    field.push(c);
                }
            }
        }
        _ => {}
    }
    Ok(false)
}

fn focused_field(app: &mut App) -> Option<&mut String> {
    match app.login_focus {
        LoginFocus::Name => Some(&mut app.login_name),
        LoginFocus::Email => Some(&mut app.login_email),
        LoginFocus::Password => Some(&mut app.login_password),
        LoginFocus::Button => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyModifiers, MouseButton, MouseEvent};

    fn mouse(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_signal_mapping() {
        let key = Event::Key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(signal_for(&key), Some(InputSignal::KeyPress));
        assert_eq!(signal_for(&mouse(MouseEventKind::Moved)), Some(InputSignal::PointerMove));
        assert_eq!(
            signal_for(&mouse(MouseEventKind::Down(MouseButton::Left))),
            Some(InputSignal::Click)
        );
        assert_eq!(signal_for(&mouse(MouseEventKind::ScrollDown)), Some(InputSignal::Scroll));
        assert_eq!(signal_for(&mouse(MouseEventKind::Up(MouseButton::Left))), None);
        assert_eq!(signal_for(&Event::Resize(80, 24)), Some(InputSignal::Resize));
        assert_eq!(signal_for(&Event::FocusLost), None);
    }

    #[test]
    fn test_key_release_is_not_activity() {
        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(signal_for(&Event::Key(release)), None);
    }
}
