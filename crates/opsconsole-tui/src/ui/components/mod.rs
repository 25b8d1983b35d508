mod help_overlay;
mod metrics_panel;
mod status_bar;

pub use help_overlay::HelpOverlay;
pub use metrics_panel::MetricsPanel;
pub use status_bar::{StatusBar, console_hints};
