use ratatui::style::{Color, Modifier, Style};

use opsconsole_logs::LogSource;

/// Color theme for the console
pub struct Theme;

impl Theme {
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;
    pub const PRIMARY: Color = Color::Cyan;
    pub const HIGHLIGHT: Color = Color::Yellow;
    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;

    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(Self::HIGHLIGHT)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn text_highlight() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Regex match inside a message
    pub fn match_highlight() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    pub fn badge(color: Color) -> Style {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn source(source: LogSource) -> Style {
        let color = match source {
            LogSource::Frontend => Color::LightBlue,
            LogSource::Backend => Color::LightGreen,
            LogSource::Ai => Color::LightMagenta,
            LogSource::Functions => Color::LightYellow,
        };
        Style::default().fg(color)
    }

    // Status bar
    pub fn status_bar() -> Style {
        Style::default().fg(Self::FG_DIM).bg(Color::DarkGray)
    }

    pub fn status_bar_key() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    /// Section heading inside the help overlay
    pub fn heading() -> Style {
        Style::default().fg(Self::HIGHLIGHT)
    }

    /// Key column inside the help overlay
    pub fn key() -> Style {
        Style::default().fg(Self::SUCCESS)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ERROR)
            .add_modifier(Modifier::BOLD)
    }
}
