pub mod components;
mod layout;
pub mod screens;
mod theme;

pub use layout::{ConsoleAreas, Layout};
pub use theme::Theme;
