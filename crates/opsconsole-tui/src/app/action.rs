/// All possible actions in the console (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    DismissNotice,

    // Filters
    CycleSource,
    CycleLevel,
    OpenTextInput,
    OpenRegexInput,
    FilterInput(char),
    FilterBackspace,
    FilterInputClear,
    ApplyFilterInput,
    CancelFilterInput,
    ClearFilters,

    // Stream and buffer control
    TogglePause,
    Reconnect,
    ClearLogs,
    ExportLogs,

    // Metrics panel
    ToggleMetrics,
    RefreshMetrics,

    // Log list
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,
    ToggleAutoScroll,
    ToggleTimestamps,
    ToggleLocalTime,
    ToggleStats,
}
