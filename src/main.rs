use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use opsconsole_logs::{
    BackoffPolicy, ConsoleHub, FilterCriteria, HttpEventSource, LogBuffer, LogLevel, LogSource,
    SnapshotWriter, StreamConnectionManager, WarmStartStore, export_file_name, export_to_file,
};
use opsconsole_metrics::{HttpMetricsSource, MetricsHistory, MetricsPoller};
use opsconsole_store::{FileBackend, PersistentStore};
use opsconsole_tui::{
    Action, AppState, ConsoleScreen, ConsoleView, Event, EventHandler, InputMode, KeyBindings,
    Preferences, Tui,
};
use opsconsole_types::{ConsoleConfig, MetricsSnapshot};

mod config;
mod headless;

/// Store key for UI preferences; never expires
const PREFERENCES_KEY: &str = "preferences";

/// opsconsole - A terminal console for live operational logs and service metrics
#[derive(Parser, Debug)]
#[command(name = "opsconsole")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: <config_dir>/opsconsole/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Event stream URL
    #[arg(long)]
    url: Option<String>,

    /// Metrics endpoint URL
    #[arg(long)]
    metrics_url: Option<String>,

    /// Buffer size for log entries
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Directory for the persistent store
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print matching events to stdout as JSON lines instead of starting the TUI
    #[arg(long)]
    headless: bool,

    /// Only show events from this source (frontend, backend, ai, functions)
    #[arg(long)]
    source: Option<String>,

    /// Only show events at this level (debug, info, warn, error)
    #[arg(long)]
    level: Option<String>,

    /// Case-insensitive substring filter on the message
    #[arg(long)]
    text: Option<String>,

    /// Regular expression filter on the message
    #[arg(long)]
    regex: Option<String>,
}

impl Args {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            url: self.url.clone(),
            metrics_url: self.metrics_url.clone(),
            buffer_size: self.buffer_size,
            state_dir: self.state_dir.clone(),
        }
    }

    /// Filters given on the command line, if any
    fn criteria(&self) -> Result<Option<FilterCriteria>> {
        if self.source.is_none() && self.level.is_none() && self.text.is_none() && self.regex.is_none() {
            return Ok(None);
        }

        let mut criteria = FilterCriteria::default();
        if let Some(source) = &self.source {
            let source = LogSource::parse(source)
                .with_context(|| format!("Unknown source '{source}'"))?;
            criteria = criteria.with_source(source);
        }
        if let Some(level) = &self.level {
            let level =
                LogLevel::parse(level).with_context(|| format!("Unknown level '{level}'"))?;
            criteria = criteria.with_level(level);
        }
        if let Some(text) = &self.text {
            criteria = criteria.with_text(text.clone());
        }
        if let Some(regex) = &self.regex {
            criteria = criteria.with_regex(regex.clone());
        }
        Ok(Some(criteria))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_file.as_deref())?;

    // Run the application
    let result = run(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Long-lived pieces shared by both front ends
struct Console {
    hub: ConsoleHub,
    poller: MetricsPoller,
    store: PersistentStore,
    snapshots: Arc<SnapshotWriter>,
    config: ConsoleConfig,
    metrics_rx: mpsc::UnboundedReceiver<MetricsSnapshot>,
}

impl Console {
    fn build(config: ConsoleConfig) -> Result<Self> {
        let dir = config::state_dir(&config);
        let backend = FileBackend::new(&dir)
            .with_context(|| format!("Failed to open state directory {}", dir.display()))?;
        let store = PersistentStore::new(
            Arc::new(backend),
            config.store.namespace.clone(),
            config.store.ttl(),
        );

        // Warm start: restore the last snapshot before any channel opens
        let warm = WarmStartStore::new(store.clone(), config.store.snapshot_ttl());
        let restored = warm.load();
        let snapshots = Arc::new(
            SnapshotWriter::spawn(warm).context("Failed to start snapshot writer")?,
        );
        let buffer = LogBuffer::new(config.buffer.capacity)
            .with_snapshot_sink(snapshots.clone(), config.buffer.snapshot_limit);
        if let Some(snapshot) = restored {
            if buffer.restore(snapshot) {
                tracing::info!(entries = buffer.len(), "Restored log snapshot");
            }
        }

        let (metrics_tx, metrics_rx) = mpsc::unbounded_channel();
        let source = Arc::new(HttpEventSource::new(config.stream.url.clone()));
        let manager = StreamConnectionManager::new(
            source,
            buffer,
            BackoffPolicy::from(&config.stream),
        )
        .with_metrics_sender(metrics_tx);

        let metrics_source = HttpMetricsSource::new(config.metrics.url.clone())
            .context("Failed to build metrics client")?;
        let poller = MetricsPoller::with_history(
            Arc::new(metrics_source),
            config.metrics.limit,
            config.metrics.window_minutes,
            MetricsHistory::new(config.metrics.history_cap),
        );

        Ok(Self {
            hub: ConsoleHub::new(manager),
            poller,
            store,
            snapshots,
            config,
            metrics_rx,
        })
    }

    /// Wait for the last log snapshot to reach the store
    async fn flush_snapshots(&self) {
        let writer = self.snapshots.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || writer.flush()).await {
            tracing::warn!(error = %e, "Snapshot flush failed");
        }
    }

    /// Fetch recent logs from the aggregate source into the buffer
    fn spawn_preload(&self) {
        let poller = self.poller.clone();
        let buffer = self.hub.buffer().clone();
        tokio::spawn(async move {
            match poller.preload_logs().await {
                Ok(events) => {
                    let outcome = buffer.append(events);
                    tracing::info!(
                        accepted = outcome.accepted,
                        duplicates = outcome.duplicates,
                        "Preloaded recent logs"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "Log preload failed"),
            }
        });
    }

    fn load_preferences(&self) -> Preferences {
        self.store.load_value(PREFERENCES_KEY).unwrap_or_default()
    }

    fn save_preferences(&self, preferences: &Preferences) {
        if let Err(e) = self.store.save_value(PREFERENCES_KEY, preferences) {
            tracing::warn!(error = %e, "Failed to save preferences");
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = config::load(args.config.as_deref())?;
    args.overrides().apply(&mut config);
    let cli_criteria = args.criteria()?;

    let console = Console::build(config)?;

    if args.headless {
        let criteria = cli_criteria.unwrap_or_default();
        let result = headless::run(console.hub.clone(), criteria).await;
        console.flush_snapshots().await;
        return result;
    }

    let mut preferences = console.load_preferences();
    if let Some(criteria) = cli_criteria {
        preferences.criteria = criteria;
    }
    run_tui(console, preferences).await
}

async fn run_tui(mut console: Console, preferences: Preferences) -> Result<()> {
    let mut state = AppState::new(preferences);
    let mut saved = state.preferences();

    console.hub.set_filters(state.server_filters());
    let subscription = console.hub.subscribe();
    console.spawn_preload();

    let polling_cancel = CancellationToken::new();
    let polling = console
        .poller
        .spawn_polling(console.config.metrics.poll_interval(), polling_cancel.clone());

    // Initialize TUI
    let mut tui = Tui::new()?;

    // Initialize event handler
    let mut events = EventHandler::new(Duration::from_millis(100));

    // Initialize keybindings
    let keybindings = KeyBindings::new();

    render(&mut tui, &mut state, &console)?;

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    Event::Key(key) => {
                        if let Some(action) = keybindings.resolve(state.is_editing(), &key) {
                            handle_action(&mut state, &console, action);
                        }
                    }
                    // New log entries show up on the next draw
                    Event::Tick | Event::Resize(_, _) => {}
                    Event::Error(e) => state.show_notice(e),
                }
            }

            // Metrics frames from the push channel
            Some(snapshot) = console.metrics_rx.recv() => {
                console.poller.apply_pushed(snapshot);
            }

            else => break,
        }

        let current = state.preferences();
        if current != saved {
            console.save_preferences(&current);
            saved = current;
        }

        if state.should_quit {
            break;
        }

        render(&mut tui, &mut state, &console)?;
    }

    // Cleanup
    polling_cancel.cancel();
    if let Err(e) = polling.await {
        tracing::warn!(error = %e, "Metrics polling task failed");
    }
    console.poller.cancel_inflight();
    drop(subscription);
    events.shutdown();
    tui.restore()?;
    console.flush_snapshots().await;

    Ok(())
}

fn handle_action(state: &mut AppState, console: &Console, action: Action) {
    let hub = &console.hub;

    match action {
        Action::Quit => state.should_quit = true,
        Action::ToggleHelp => state.ui_state.help_visible = !state.ui_state.help_visible,
        Action::DismissNotice => {
            state.ui_state.help_visible = false;
            state.dismiss_notice();
        }

        // Filters; only source/level/text changes rebuild the channel
        Action::CycleSource => {
            if state.cycle_source() {
                hub.set_filters(state.server_filters());
            }
        }
        Action::CycleLevel => {
            if state.cycle_level() {
                hub.set_filters(state.server_filters());
            }
        }
        Action::OpenTextInput => state.start_input(InputMode::Text),
        Action::OpenRegexInput => state.start_input(InputMode::Regex),
        Action::FilterInput(c) => state.input_char(c),
        Action::FilterBackspace => state.input_backspace(),
        Action::FilterInputClear => state.input_clear(),
        Action::ApplyFilterInput => {
            if state.apply_input() {
                hub.set_filters(state.server_filters());
            }
        }
        Action::CancelFilterInput => state.cancel_input(),
        Action::ClearFilters => {
            if state.clear_filters() {
                hub.set_filters(state.server_filters());
            }
        }

        // Stream
        Action::TogglePause => {
            state.toggle_pause();
            state.show_notice(if state.paused { "Paused" } else { "Resumed" });
        }
        Action::Reconnect => {
            hub.reconnect();
            state.show_notice("Reconnecting…");
        }
        Action::ClearLogs => {
            hub.buffer().clear();
            state.ui_state.filter_cache.invalidate();
            state.scroll_to_bottom();
            state.show_notice("Cleared logs");
        }
        Action::ExportLogs => {
            let filename = export_file_name(Local::now());
            let events = state.visible_events(hub.buffer()).to_vec();
            match export_to_file(Path::new(&filename), &events) {
                Ok(count) => state.show_notice(format!("Exported {count} logs to {filename}")),
                Err(e) => state.show_notice(format!("Export failed: {e}")),
            }
        }

        // Metrics
        Action::ToggleMetrics => state.ui_state.metrics_visible = !state.ui_state.metrics_visible,
        Action::RefreshMetrics => {
            let poller = console.poller.clone();
            tokio::spawn(async move {
                let outcome = poller.fetch_metrics().await;
                tracing::debug!(?outcome, "Manual metrics refresh");
            });
        }

        // Navigation and display
        Action::ScrollUp(n) => state.scroll_up(n),
        Action::ScrollDown(n) => state.scroll_down(n),
        Action::ScrollToTop => state.scroll_to_top(),
        Action::ScrollToBottom => state.scroll_to_bottom(),
        Action::PageUp => state.page_up(),
        Action::PageDown => state.page_down(),
        Action::ToggleAutoScroll => state.ui_state.auto_scroll = !state.ui_state.auto_scroll,
        Action::ToggleTimestamps => {
            state.ui_state.show_timestamps = !state.ui_state.show_timestamps;
        }
        Action::ToggleLocalTime => state.ui_state.use_local_time = !state.ui_state.use_local_time,
        Action::ToggleStats => state.ui_state.stats_visible = !state.ui_state.stats_visible,
    }
}

fn render(tui: &mut Tui, state: &mut AppState, console: &Console) -> Result<()> {
    let status = console.hub.status();
    let metrics = console.poller.state();
    let view = ConsoleView {
        buffer: console.hub.buffer(),
        status: &status,
        metrics: &metrics,
        stream: console.hub.stream_stats(),
    };

    tui.draw(|frame| ConsoleScreen::render(frame, state, &view))?;
    Ok(())
}
