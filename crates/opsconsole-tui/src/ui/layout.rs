use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Height of the metrics panel including borders
const METRICS_HEIGHT: u16 = 8;

/// Regions of the console screen; optional panels are `None` when hidden
pub struct ConsoleAreas {
    pub header: Rect,
    pub metrics: Option<Rect>,
    pub stats: Option<Rect>,
    pub filter_bar: Rect,
    pub logs: Rect,
    pub status_bar: Rect,
}

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    pub fn console(area: Rect, show_metrics: bool, show_stats: bool) -> ConsoleAreas {
        let mut constraints = vec![Constraint::Length(3)]; // Header
        if show_metrics {
            constraints.push(Constraint::Length(METRICS_HEIGHT));
        }
        if show_stats {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Length(3)); // Filter bar
        constraints.push(Constraint::Min(1)); // Logs
        constraints.push(Constraint::Length(1)); // Status bar

        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut next = chunks.iter().copied();
        let mut take = || next.next().unwrap_or_default();

        let header = take();
        let metrics = show_metrics.then(&mut take);
        let stats = show_stats.then(&mut take);
        ConsoleAreas {
            header,
            metrics,
            stats,
            filter_bar: take(),
            logs: take(),
            status_bar: take(),
        }
    }

    /// Split the metrics panel into figures (left) and sparklines (right)
    pub fn metrics_panel(area: Rect) -> (Rect, Rect) {
        let chunks = RatatuiLayout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);
        (chunks[0], chunks[1])
    }

    /// Centered popup of at most `width` x `height`
    pub fn popup(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(4));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}
