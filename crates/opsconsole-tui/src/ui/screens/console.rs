use chrono::Local;
use ratatui::{
    Frame,
    layout::{Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::UnicodeWidthChar;

use opsconsole_logs::{CompiledFilter, LogBuffer, LogEvent, StreamStats};
use opsconsole_metrics::MetricsState;
use opsconsole_types::{ConnectionState, ConnectionStatus};

use crate::app::{AppState, InputMode};
use crate::ui::components::{HelpOverlay, MetricsPanel, StatusBar, console_hints};
use crate::ui::{Layout, Theme};

/// Everything the console reads besides its own state
pub struct ConsoleView<'a> {
    pub buffer: &'a LogBuffer,
    pub status: &'a ConnectionStatus,
    pub metrics: &'a MetricsState,
    pub stream: StreamStats,
}

/// The single console screen
pub struct ConsoleScreen;

impl ConsoleScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, view: &ConsoleView) {
        let areas = Layout::console(
            frame.area(),
            state.ui_state.metrics_visible,
            state.ui_state.stats_visible,
        );

        Self::render_header(frame, areas.header, state, view);
        if let Some(area) = areas.metrics {
            MetricsPanel::render(frame, area, view.metrics, state.ui_state.use_local_time);
        }
        if let Some(area) = areas.stats {
            Self::render_stats_bar(frame, area, view);
        }
        Self::render_filter_bar(frame, areas.filter_bar, state);
        Self::render_logs(frame, areas.logs, state, view.buffer);
        Self::render_status_bar(frame, areas.status_bar, state);

        if state.ui_state.help_visible {
            HelpOverlay::render(frame);
        }
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState, view: &ConsoleView) {
        let status = view.status;
        let stats = view.buffer.stats();

        let mut spans = vec![
            Span::styled("opsconsole", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled("● ", Style::default().fg(status.state.color())),
            Span::styled(status.state.label(), Theme::badge(status.state.color())),
        ];

        if status.state == ConnectionState::Disconnected {
            if status.failures > 0 {
                spans.push(Span::styled(
                    format!(" ({} failed)", status.failures),
                    Theme::text_dim(),
                ));
            }
            if let Some(error) = &status.last_error {
                spans.push(Span::styled(format!(" {error}"), Style::default().fg(Theme::ERROR)));
            }
            spans.push(Span::styled(" [r] reconnect", Theme::text_dim()));
        }

        spans.push(Span::styled(" │ ", Theme::text_dim()));
        spans.push(Span::styled(
            format!("{}/{} buffered", stats.len, stats.capacity),
            Theme::text(),
        ));
        spans.push(Span::styled(" │ ", Theme::text_dim()));
        spans.push(Span::styled(
            format!("{} received", stats.total_received),
            Theme::text(),
        ));
        if stats.total_dropped > 0 {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(
                format!(
                    "{} dropped ({:.1}%)",
                    stats.total_dropped, stats.dropped_percentage
                ),
                Style::default().fg(Theme::WARNING),
            ));
        }
        let stream = view.stream;
        if stream.frames_skipped > 0 || stream.entries_rejected > 0 {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(
                format!(
                    "{} bad frames, {} bad entries",
                    stream.frames_skipped, stream.entries_rejected
                ),
                Style::default().fg(Theme::WARNING),
            ));
        }
        if state.paused {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(
                "PAUSED",
                Style::default()
                    .fg(Theme::HIGHLIGHT)
                    .add_modifier(Modifier::BOLD | Modifier::REVERSED),
            ));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );
        frame.render_widget(header, area);
    }

    fn render_stats_bar(frame: &mut Frame, area: Rect, view: &ConsoleView) {
        let counts = view.buffer.counts();
        let stream = view.stream;

        let counter = |label: &str, value: usize, style: Style| {
            [
                Span::styled(format!("{label}:"), style),
                Span::styled(format!("{value} "), Theme::text()),
            ]
        };

        let mut spans = vec![Span::styled(" ", Theme::text())];
        spans.extend(counter("ERR", counts.error, Theme::badge(Theme::ERROR)));
        spans.extend(counter("WRN", counts.warn, Theme::badge(Theme::WARNING)));
        spans.extend(counter("INF", counts.info, Theme::badge(Theme::SUCCESS)));
        spans.extend(counter("DBG", counts.debug, Theme::badge(Theme::PRIMARY)));
        spans.push(Span::styled("│ ", Theme::text_dim()));
        spans.extend(counter("web", counts.frontend, Theme::text_dim()));
        spans.extend(counter("api", counts.backend, Theme::text_dim()));
        spans.extend(counter("ai", counts.ai, Theme::text_dim()));
        spans.extend(counter("fn", counts.functions, Theme::text_dim()));
        spans.push(Span::styled("│ ", Theme::text_dim()));
        spans.push(Span::styled(
            format!(
                "frames {} • heartbeats {} • connects {}",
                stream.frames_received, stream.heartbeats, stream.connections
            ),
            Theme::text_dim(),
        ));

        let widget = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(" Stats ", Theme::title())),
        );
        frame.render_widget(widget, area);
    }

    fn render_filter_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let criteria = state.criteria();
        let editing = state.ui_state.input_mode;

        let chip = |label: &'static str, value: Option<String>| -> Vec<Span<'static>> {
            vec![
                Span::styled(format!(" {label}:"), Theme::text_dim()),
                match value {
                    Some(v) => Span::styled(v, Theme::text_highlight()),
                    None => Span::styled("any", Theme::text_dim()),
                },
            ]
        };

        let mut spans = Vec::new();
        spans.extend(chip("source", criteria.source.map(|s| s.as_str().to_string())));
        spans.extend(chip("level", criteria.level.map(|l| l.as_str().to_string())));

        let input = |mode: InputMode, current: &Option<String>| -> Option<String> {
            if editing == mode {
                Some(format!("{}█", state.ui_state.input))
            } else {
                current.clone()
            }
        };
        spans.extend(chip("text", input(InputMode::Text, &criteria.text)));
        spans.extend(chip("regex", input(InputMode::Regex, &criteria.regex)));

        if let Some(error) = state.filter().regex_error() {
            spans.push(Span::styled(
                format!("  ⚠ regex ignored: {}", first_line(error)),
                Style::default().fg(Theme::ERROR),
            ));
        }

        if editing != InputMode::Normal {
            spans.push(Span::styled("  [Enter] Apply  [Esc] Cancel", Theme::text_dim()));
        }

        let border_style = if editing != InputMode::Normal {
            Theme::border_focused()
        } else if state.filter().regex_error().is_some() {
            Style::default().fg(Theme::ERROR)
        } else {
            Theme::border()
        };

        let widget = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(Span::styled(" Filter ", Theme::title())),
        );
        frame.render_widget(widget, area);
    }

    fn render_logs(frame: &mut Frame, area: Rect, state: &mut AppState, buffer: &LogBuffer) {
        let inner_height = area.height.saturating_sub(2) as usize;
        // 2 for borders, 1 for the scrollbar
        let inner_width = area.width.saturating_sub(3) as usize;
        let show_timestamps = state.ui_state.show_timestamps;
        let local = state.ui_state.use_local_time;
        let filtered = !state.criteria().is_empty();

        let total = state.visible_events(buffer).len();

        let max_scroll = total.saturating_sub(inner_height);
        if state.ui_state.auto_scroll {
            state.ui_state.log_scroll = max_scroll;
        }
        state.ui_state.log_scroll = state.ui_state.log_scroll.min(max_scroll);
        let scroll = state.ui_state.log_scroll;

        let lines: Vec<Line> = state
            .ui_state
            .filter_cache
            .entries()
            .iter()
            .skip(scroll)
            .take(inner_height)
            .map(|event| format_event_line(event, state.filter(), show_timestamps, local, inner_width))
            .collect();

        let title = if filtered {
            format!(" Logs ({total} matching) ")
        } else {
            format!(" Logs ({total}) ")
        };

        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(title, Theme::title())),
        );
        frame.render_widget(widget, area);

        if total > inner_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));
            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(scroll);
            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let hints = console_hints(state.paused);
        let bar = match &state.ui_state.notice {
            Some(notice) => StatusBar::new()
                .hints(hints)
                .right(notice.clone())
                .right_style(Theme::status_bar_key()),
            None => StatusBar::new().hints(hints).right(if state.ui_state.auto_scroll {
                "follow ▼"
            } else {
                "scroll"
            }),
        };
        frame.render_widget(bar, area);
    }
}

/// One log row: time, source, level, message with regex matches highlighted
pub fn format_event_line(
    event: &LogEvent,
    filter: &CompiledFilter,
    show_timestamp: bool,
    local: bool,
    width: usize,
) -> Line<'static> {
    let mut spans = Vec::new();
    let mut prefix_width = 0;

    if show_timestamp {
        let at = event.datetime();
        let time = if local {
            at.with_timezone(&Local).format("%H:%M:%S%.3f").to_string()
        } else {
            at.format("%H:%M:%S%.3f").to_string()
        };
        prefix_width += time.len() + 1;
        spans.push(Span::styled(format!("{time} "), Theme::text_dim()));
    }

    spans.push(Span::styled(event.source.short().to_string(), Theme::source(event.source)));
    spans.push(Span::styled(
        format!(" {}", event.level.short()),
        Theme::badge(event.level.color()),
    ));
    spans.push(Span::styled(" │ ", Theme::text_dim()));
    prefix_width += 3 + 4 + 3;

    let mut message = event.message.clone();
    if !event.metadata.is_empty() {
        if let Ok(meta) = serde_json::to_string(&event.metadata) {
            message.push(' ');
            message.push_str(&meta);
        }
    }
    let message = truncate_to_width(&message, width.saturating_sub(prefix_width));
    let base = Style::default().fg(event.level.color());

    let mut last_end = 0;
    for (start, end) in filter.find_matches(&message) {
        if start > last_end {
            spans.push(Span::styled(message[last_end..start].to_string(), base));
        }
        spans.push(Span::styled(message[start..end].to_string(), Theme::match_highlight()));
        last_end = end;
    }
    if last_end < message.len() {
        spans.push(Span::styled(message[last_end..].to_string(), base));
    }

    Line::from(spans)
}

/// Cut `s` to at most `max` display columns, marking the cut with an ellipsis
fn truncate_to_width(s: &str, max: usize) -> String {
    let single_line: String = s.chars().map(|c| if c == '\n' { '⏎' } else { c }).collect();
    let total: usize = single_line.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= max {
        return single_line;
    }

    let budget = max.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for c in single_line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if max > 0 {
        out.push('…');
    }
    out
}

fn first_line(s: &str) -> &str {
    s.lines().find(|l| !l.trim().is_empty()).unwrap_or(s)
}
