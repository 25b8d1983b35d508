use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use crate::ui::Theme;

/// Status bar showing keyboard shortcuts, with optional right-aligned text
pub struct StatusBar<'a> {
    hints: Vec<(&'a str, &'a str)>,
    right_text: Option<String>,
    right_style: Style,
}

impl<'a> StatusBar<'a> {
    pub fn new() -> Self {
        Self {
            hints: Vec::new(),
            right_text: None,
            right_style: Theme::status_bar(),
        }
    }

    /// Add keyboard hints as (key, description) pairs
    pub fn hints<I>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.hints = hints.into_iter().collect();
        self
    }

    /// Set text to display on the right side
    pub fn right<S: Into<String>>(mut self, text: S) -> Self {
        self.right_text = Some(text.into());
        self
    }

    pub fn right_style(mut self, style: Style) -> Self {
        self.right_style = style;
        self
    }
}

impl Default for StatusBar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Theme::status_bar());

        let mut spans = Vec::new();
        for (i, (key, desc)) in self.hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" ", Theme::status_bar()));
            }
            spans.push(Span::styled(format!("[{key}]"), Theme::status_bar_key()));
            spans.push(Span::styled(*desc, Theme::status_bar()));
        }

        let line = Line::from(spans);
        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));

        // Right text wins over hints when space is short
        if let Some(right) = self.right_text {
            let right_width = right.width() as u16;
            let right_x = area.x + area.width.saturating_sub(right_width + 1);
            if right_width + 2 <= area.width {
                let span = Span::styled(format!(" {right}"), self.right_style);
                buf.set_span(right_x.saturating_sub(1), area.y, &span, right_width + 1);
            }
        }
    }
}

/// Hints for the console screen
pub fn console_hints(paused: bool) -> Vec<(&'static str, &'static str)> {
    vec![
        ("s", "Source"),
        ("l", "Level"),
        ("/", "Text"),
        ("R", "Regex"),
        ("p", if paused { "Resume" } else { "Pause" }),
        ("r", "Reconnect"),
        ("e", "Export"),
        ("?", "Help"),
        ("q", "Quit"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(bar: StatusBar, width: u16) -> String {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        bar.render(area, &mut buf);
        (0..width).map(|x| buf[(x, 0)].symbol().to_string()).collect()
    }

    #[test]
    fn test_hints_and_right_text() {
        let text = rendered(
            StatusBar::new().hints([("q", "Quit")]).right("12 logs"),
            40,
        );
        assert!(text.contains("[q]Quit"));
        assert!(text.trim_end().ends_with("12 logs"));
    }

    #[test]
    fn test_pause_hint_flips() {
        assert!(console_hints(true).contains(&("p", "Resume")));
        assert!(console_hints(false).contains(&("p", "Pause")));
    }
}
