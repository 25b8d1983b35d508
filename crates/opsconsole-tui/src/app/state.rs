use serde::{Deserialize, Serialize};

use opsconsole_logs::{ArcLogEvent, CompiledFilter, FilterCriteria, LogBuffer, LogLevel, LogSource};

/// Lines moved by page up/down
const PAGE: usize = 20;

/// Memoized `filter(buffer, criteria)`, keyed on criteria and buffer revision
#[derive(Default)]
pub struct FilterCache {
    key: Option<(FilterCriteria, u64)>,
    entries: Vec<ArcLogEvent>,
}

impl FilterCache {
    pub fn needs_refresh(&self, criteria: &FilterCriteria, revision: u64) -> bool {
        match &self.key {
            Some((cached, cached_revision)) => cached != criteria || *cached_revision != revision,
            None => true,
        }
    }

    /// Frozen views only react to criteria changes
    pub fn needs_refresh_frozen(&self, criteria: &FilterCriteria) -> bool {
        self.key.as_ref().is_none_or(|(cached, _)| cached != criteria)
    }

    pub fn update(&mut self, criteria: &FilterCriteria, revision: u64, entries: Vec<ArcLogEvent>) {
        self.key = Some((criteria.clone(), revision));
        self.entries = entries;
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    pub fn entries(&self) -> &[ArcLogEvent] {
        &self.entries
    }
}

/// Which filter field the input bar edits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Text,
    Regex,
}

/// Operator preferences persisted between runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub criteria: FilterCriteria,
    pub paused: bool,
    pub show_metrics: bool,
    pub show_timestamps: bool,
    pub use_local_time: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            criteria: FilterCriteria::default(),
            paused: false,
            show_metrics: true,
            show_timestamps: true,
            use_local_time: true,
        }
    }
}

/// UI-specific transient state
pub struct UiState {
    pub input_mode: InputMode,

    /// Text being typed into the filter bar
    pub input: String,

    pub help_visible: bool,

    /// Transient message (export result, errors) shown in the status bar
    pub notice: Option<String>,

    /// First visible row of the log list
    pub log_scroll: usize,

    /// Follow new entries
    pub auto_scroll: bool,

    pub show_timestamps: bool,
    pub use_local_time: bool,
    pub metrics_visible: bool,
    pub stats_visible: bool,

    pub filter_cache: FilterCache,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            input_mode: InputMode::Normal,
            input: String::new(),
            help_visible: false,
            notice: None,
            log_scroll: 0,
            auto_scroll: true,
            show_timestamps: true,
            use_local_time: true,
            metrics_visible: true,
            stats_visible: false,
            filter_cache: FilterCache::default(),
        }
    }
}

/// Console state owned by the event loop
pub struct AppState {
    filter: CompiledFilter,

    /// Rendered list frozen; ingestion continues
    pub paused: bool,

    pub ui_state: UiState,

    pub should_quit: bool,
}

impl AppState {
    pub fn new(preferences: Preferences) -> Self {
        let ui_state = UiState {
            metrics_visible: preferences.show_metrics,
            show_timestamps: preferences.show_timestamps,
            use_local_time: preferences.use_local_time,
            ..Default::default()
        };

        Self {
            filter: CompiledFilter::compile(&preferences.criteria),
            paused: preferences.paused,
            ui_state,
            should_quit: false,
        }
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            criteria: self.criteria().clone(),
            paused: self.paused,
            show_metrics: self.ui_state.metrics_visible,
            show_timestamps: self.ui_state.show_timestamps,
            use_local_time: self.ui_state.use_local_time,
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        self.filter.criteria()
    }

    pub fn filter(&self) -> &CompiledFilter {
        &self.filter
    }

    /// Criteria to request from the push channel
    pub fn server_filters(&self) -> FilterCriteria {
        self.criteria().server_side()
    }

    /// Replace the criteria, returning whether the server-side part changed
    pub fn set_criteria(&mut self, criteria: FilterCriteria) -> bool {
        let server_changed = criteria.server_side() != self.server_filters();
        self.filter = CompiledFilter::compile(&criteria);
        self.ui_state.log_scroll = 0;
        self.ui_state.auto_scroll = true;
        server_changed
    }

    pub fn cycle_source(&mut self) -> bool {
        let criteria = FilterCriteria {
            source: LogSource::cycle(self.criteria().source),
            ..self.criteria().clone()
        };
        self.set_criteria(criteria)
    }

    pub fn cycle_level(&mut self) -> bool {
        let criteria = FilterCriteria {
            level: LogLevel::cycle(self.criteria().level),
            ..self.criteria().clone()
        };
        self.set_criteria(criteria)
    }

    pub fn clear_filters(&mut self) -> bool {
        self.ui_state.input.clear();
        self.set_criteria(FilterCriteria::default())
    }

    /// Start editing the text or regex filter, seeded with its current value
    pub fn start_input(&mut self, mode: InputMode) {
        let current = match mode {
            InputMode::Text => self.criteria().text.clone(),
            InputMode::Regex => self.criteria().regex.clone(),
            InputMode::Normal => None,
        };
        self.ui_state.input = current.unwrap_or_default();
        self.ui_state.input_mode = mode;
    }

    pub fn is_editing(&self) -> bool {
        self.ui_state.input_mode != InputMode::Normal
    }

    pub fn input_char(&mut self, c: char) {
        self.ui_state.input.push(c);
    }

    pub fn input_backspace(&mut self) {
        self.ui_state.input.pop();
    }

    pub fn input_clear(&mut self) {
        self.ui_state.input.clear();
    }

    pub fn cancel_input(&mut self) {
        self.ui_state.input_mode = InputMode::Normal;
        self.ui_state.input.clear();
    }

    /// Commit the input bar, returning whether the server-side part changed
    ///
    /// An invalid regex is still committed; it shows as an error in the
    /// filter bar while the other predicates keep applying.
    pub fn apply_input(&mut self) -> bool {
        let value = std::mem::take(&mut self.ui_state.input);
        let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        let mode = std::mem::replace(&mut self.ui_state.input_mode, InputMode::Normal);

        let mut criteria = self.criteria().clone();
        match mode {
            InputMode::Text => criteria.text = value,
            InputMode::Regex => criteria.regex = value,
            InputMode::Normal => return false,
        }
        self.set_criteria(criteria)
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        if !self.paused {
            self.ui_state.filter_cache.invalidate();
        }
    }

    pub fn show_notice(&mut self, msg: impl Into<String>) {
        self.ui_state.notice = Some(msg.into());
    }

    pub fn dismiss_notice(&mut self) {
        self.ui_state.notice = None;
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(n);
    }

    /// Render clamps to the filtered length
    pub fn scroll_down(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(n);
    }

    pub fn page_up(&mut self) {
        self.scroll_up(PAGE);
    }

    pub fn page_down(&mut self) {
        self.scroll_down(PAGE);
    }

    pub fn scroll_to_top(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.ui_state.auto_scroll = true;
        self.ui_state.log_scroll = usize::MAX;
    }

    /// Filtered, timestamp-ordered entries to display
    ///
    /// Recomputed only when the criteria or the buffer revision change; while
    /// paused only a criteria change refreshes the list.
    pub fn visible_events(&mut self, buffer: &LogBuffer) -> &[ArcLogEvent] {
        let criteria = self.filter.criteria();
        let cache = &self.ui_state.filter_cache;
        let refresh = if self.paused {
            cache.needs_refresh_frozen(criteria)
        } else {
            cache.needs_refresh(criteria, buffer.revision())
        };

        if refresh {
            let (revision, events) = buffer.versioned();
            let mut entries = opsconsole_logs::filter(&events, &self.filter);
            opsconsole_logs::sort_by_timestamp(&mut entries);
            self.ui_state
                .filter_cache
                .update(self.filter.criteria(), revision, entries);
        }

        self.ui_state.filter_cache.entries()
    }
}
