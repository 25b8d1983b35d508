use ratatui::{
    Frame,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::ui::{Layout, Theme};

/// Key reference grouped by section, in display order
const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("j/↓ k/↑", "Scroll down / up"),
            ("Ctrl+d/u", "Page down / up"),
            ("g / G", "Top / bottom (follow)"),
            ("f", "Toggle follow mode"),
        ],
    ),
    (
        "Filters",
        &[
            ("s", "Cycle source"),
            ("l", "Cycle level"),
            ("/", "Text filter"),
            ("R", "Regex filter"),
            ("n", "Clear filters"),
        ],
    ),
    (
        "Stream",
        &[
            ("p", "Pause / resume list"),
            ("r", "Reconnect"),
            ("c", "Clear buffer"),
            ("e", "Export filtered logs"),
        ],
    ),
    (
        "Display",
        &[
            ("m", "Toggle metrics panel"),
            ("M", "Refresh metrics now"),
            ("i", "Toggle stats"),
            ("t / T", "Timestamps / local time"),
            ("Esc", "Dismiss message"),
            ("?", "Toggle this help"),
            ("q", "Quit"),
        ],
    ),
];

/// Keybinding reference drawn over the console
pub struct HelpOverlay;

impl HelpOverlay {
    pub fn render(frame: &mut Frame) {
        let lines = Self::lines();
        let height = lines.len() as u16 + 2;
        let area = Layout::popup(frame.area(), 50, height);
        frame.render_widget(Clear, area);

        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border_focused())
                .title(Span::styled(" Help ", Theme::title())),
        );
        frame.render_widget(widget, area);
    }

    fn lines() -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for (i, (title, keys)) in SECTIONS.iter().enumerate() {
            if i > 0 {
                lines.push(Line::default());
            }
            lines.push(Line::from(Span::styled(*title, Theme::heading())));
            lines.extend(keys.iter().map(|(key, desc)| {
                Line::from(vec![
                    Span::styled(format!("  {key:>9}"), Theme::key()),
                    Span::styled(format!("  {desc}"), Theme::text()),
                ])
            }));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_section_has_a_heading() {
        let lines = HelpOverlay::lines();
        let headings: Vec<String> = lines
            .iter()
            .filter(|l| l.spans.len() == 1)
            .map(|l| l.spans[0].content.to_string())
            .collect();
        assert_eq!(headings, ["Navigation", "Filters", "Stream", "Display"]);
    }
}
