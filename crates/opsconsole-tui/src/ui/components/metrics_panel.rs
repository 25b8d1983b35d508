use chrono::{DateTime, Local, Utc};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout as RatatuiLayout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
};

use opsconsole_metrics::MetricsState;
use opsconsole_types::MetricsSnapshot;

use crate::ui::{Layout, Theme};

/// Functions listed in the breakdown line
const TOP_FUNCTIONS: usize = 3;

/// Aggregate metrics with severity banding and sparklines
///
/// After a failed refresh the last good snapshot stays on screen with an
/// error note underneath.
pub struct MetricsPanel;

impl MetricsPanel {
    pub fn render(frame: &mut Frame, area: Rect, metrics: &MetricsState, use_local_time: bool) {
        let severity = metrics.snapshot.as_ref().map(|s| s.severity());
        let border_style = match severity {
            Some(severity) => Style::default().fg(severity.color()),
            None => Theme::border(),
        };
        let title = match &metrics.snapshot {
            Some(s) => format!(" Metrics ({}m) ", s.window_minutes),
            None => " Metrics ".to_string(),
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(title, Theme::title()));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let (text_area, chart_area) = Layout::metrics_panel(inner);
        let lines = Self::summary_lines(metrics, use_local_time);
        frame.render_widget(Paragraph::new(lines), text_area);

        if !metrics.history.is_empty() {
            Self::render_sparklines(frame, chart_area, metrics);
        }
    }

    fn render_sparklines(frame: &mut Frame, area: Rect, metrics: &MetricsState) {
        let rows = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
            .split(area);

        let invocations = metrics.history.invocation_series();
        let errors = metrics.history.error_rate_series();
        let error_color = metrics
            .snapshot
            .as_ref()
            .map(|s| s.severity().color())
            .unwrap_or(Theme::FG_DIM);

        // Newest points on the right edge
        let fit = |series: &[u64], width: u16| -> Vec<u64> {
            let skip = series.len().saturating_sub(width as usize);
            series[skip..].to_vec()
        };

        let invocations = fit(&invocations, rows[0].width);
        frame.render_widget(
            Sparkline::default()
                .block(Block::default().title(Span::styled("inv/min", Theme::text_dim())))
                .data(&invocations)
                .style(Style::default().fg(Theme::PRIMARY)),
            rows[0],
        );

        let errors = fit(&errors, rows[1].width);
        frame.render_widget(
            Sparkline::default()
                .block(Block::default().title(Span::styled("error rate", Theme::text_dim())))
                .data(&errors)
                .style(Style::default().fg(error_color)),
            rows[1],
        );
    }

    /// Text half of the panel
    pub fn summary_lines(metrics: &MetricsState, use_local_time: bool) -> Vec<Line<'static>> {
        let Some(snapshot) = &metrics.snapshot else {
            let line = match (&metrics.error, metrics.loading) {
                (Some(error), _) => Line::from(Span::styled(format!("⚠ {error}"), Theme::error())),
                (None, true) => Line::from(Span::styled("Loading metrics…", Theme::text_dim())),
                (None, false) => Line::from(Span::styled("No metrics yet", Theme::text_dim())),
            };
            return vec![line];
        };

        let severity = snapshot.severity();
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Error rate ", Theme::text_dim()),
                Span::styled(
                    format!("{:.2}% {}", snapshot.error_rate * 100.0, severity.label().to_uppercase()),
                    Theme::badge(severity.color()),
                ),
                Span::styled(" │ ", Theme::text_dim()),
                Span::styled(format!("{:.1} inv/min", snapshot.invocations_per_minute), Theme::text()),
                Span::styled(" │ ", Theme::text_dim()),
                Span::styled(
                    format!("{} calls, {} errors", snapshot.total, snapshot.errors),
                    Theme::text(),
                ),
            ]),
            Line::from(vec![
                Span::styled("Latency ", Theme::text_dim()),
                Span::styled(
                    format!(
                        "p50 {:.0}ms  p95 {:.0}ms  p99 {:.0}ms  avg {:.0}ms",
                        snapshot.latency.p50,
                        snapshot.latency.p95,
                        snapshot.latency.p99,
                        snapshot.latency.average
                    ),
                    Theme::text(),
                ),
            ]),
        ];

        if let Some(line) = Self::functions_line(snapshot) {
            lines.push(line);
        }

        let mut footer = vec![Span::styled(
            format!("Observed {}", format_time(snapshot.observed_at, use_local_time)),
            Theme::text_dim(),
        )];
        if let Some(remaining) = metrics.rate_limit_remaining {
            footer.push(Span::styled(format!(" • {remaining} requests left"), Theme::text_dim()));
        }
        if metrics.loading {
            footer.push(Span::styled(" • refreshing", Theme::text_dim()));
        }
        lines.push(Line::from(footer));

        if let Some(error) = &metrics.error {
            lines.push(Line::from(Span::styled(
                format!("⚠ refresh failed: {error} (showing last good data)"),
                Style::default().fg(Theme::WARNING),
            )));
        }

        lines
    }

    /// Worst functions by error rate
    fn functions_line(snapshot: &MetricsSnapshot) -> Option<Line<'static>> {
        let mut functions: Vec<_> = snapshot
            .functions
            .iter()
            .filter(|(_, f)| f.errors > 0)
            .collect();
        if functions.is_empty() {
            return None;
        }
        functions.sort_by(|a, b| b.1.error_rate.total_cmp(&a.1.error_rate));

        let mut spans = vec![Span::styled("Top errors ", Theme::text_dim())];
        for (i, (name, f)) in functions.into_iter().take(TOP_FUNCTIONS).enumerate() {
            if i > 0 {
                spans.push(Span::styled(", ", Theme::text_dim()));
            }
            spans.push(Span::styled(
                format!("{name} {:.1}%", f.error_rate * 100.0),
                Theme::badge(opsconsole_types::Severity::from_error_rate(f.error_rate).color()),
            ));
        }
        Some(Line::from(spans))
    }
}

fn format_time(at: DateTime<Utc>, local: bool) -> String {
    if local {
        at.with_timezone(&Local).format("%H:%M:%S").to_string()
    } else {
        at.format("%H:%M:%S UTC").to_string()
    }
}
