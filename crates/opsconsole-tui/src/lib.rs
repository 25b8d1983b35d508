//! TUI components for opsconsole
//!
//! This crate provides the terminal user interface for opsconsole,
//! including state management, keybindings, event handling, and UI components.

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, FilterCache, InputMode, Preferences, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui};
pub use ui::components::{HelpOverlay, MetricsPanel, StatusBar, console_hints};
pub use ui::screens::{ConsoleScreen, ConsoleView};
pub use ui::{Layout, Theme};
