//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout, login form and dialogs
//! - `input`: keyboard handling and input-signal mapping
//! - `styles`: color scheme and text styling

pub mod input;
pub mod render;
pub mod styles;
