use regex::Regex;
use serde::{Deserialize, Serialize};

use opsconsole_types::{ArcLogEvent, LogEvent, LogLevel, LogSource};

/// What the operator asked to see; every field is optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub source: Option<LogSource>,
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the message
    pub text: Option<String>,
    /// Regular expression matched against the message
    pub regex: Option<String>,
}

impl FilterCriteria {
    pub fn with_source(mut self, source: LogSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Check if criteria are empty (match everything)
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.level.is_none()
            && non_empty(&self.text).is_none()
            && non_empty(&self.regex).is_none()
    }

    /// Query parameters for the server-side part of the filter
    ///
    /// The regex stays client-side; the stream endpoint does not accept it.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(source) = self.source {
            pairs.push(("source", source.as_str().to_string()));
        }
        if let Some(level) = self.level {
            pairs.push(("level", level.as_str().to_string()));
        }
        if let Some(text) = non_empty(&self.text) {
            pairs.push(("text", text.to_string()));
        }
        pairs
    }

    /// The part of the criteria the push channel filters on
    pub fn server_side(&self) -> FilterCriteria {
        FilterCriteria {
            source: self.source,
            level: self.level,
            text: non_empty(&self.text).map(str::to_string),
            regex: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Outcome of compiling the regex part of a filter
#[derive(Clone, Debug)]
pub enum RegexPredicate {
    /// No regex requested
    Inactive,
    Compiled(Regex),
    /// Pattern failed to compile; the predicate is skipped
    Disabled { pattern: String, error: String },
}

/// Filter compiled once per criteria change
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    criteria: FilterCriteria,

    /// Lowercased needle for the substring predicate
    needle: Option<String>,

    regex: RegexPredicate,
}

impl CompiledFilter {
    /// Compile criteria; never fails
    ///
    /// An invalid regex disables only the regex predicate. Source, level and
    /// text still apply.
    pub fn compile(criteria: &FilterCriteria) -> Self {
        let regex = match non_empty(&criteria.regex) {
            None => RegexPredicate::Inactive,
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => RegexPredicate::Compiled(re),
                Err(e) => {
                    tracing::debug!(pattern, error = %e, "Regex filter disabled");
                    RegexPredicate::Disabled {
                        pattern: pattern.to_string(),
                        error: e.to_string(),
                    }
                }
            },
        };

        Self {
            criteria: criteria.clone(),
            needle: non_empty(&criteria.text).map(str::to_lowercase),
            regex,
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn regex(&self) -> &RegexPredicate {
        &self.regex
    }

    /// Compile error of the regex predicate, if it was disabled
    pub fn regex_error(&self) -> Option<&str> {
        match &self.regex {
            RegexPredicate::Disabled { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Check if an event matches; equality checks run before text and regex
    pub fn matches(&self, event: &LogEvent) -> bool {
        if self.criteria.source.is_some_and(|s| s != event.source) {
            return false;
        }
        if self.criteria.level.is_some_and(|l| l != event.level) {
            return false;
        }
        if let Some(needle) = &self.needle {
            if !event.message.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        match &self.regex {
            RegexPredicate::Compiled(re) => re.is_match(&event.message),
            RegexPredicate::Inactive | RegexPredicate::Disabled { .. } => true,
        }
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            RegexPredicate::Compiled(re) => {
                re.find_iter(text).map(|m| (m.start(), m.end())).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Events matching `filter`, in buffer order
///
/// Pure: identical inputs always give identical output, so callers can
/// memoize on (buffer revision, criteria).
pub fn filter(events: &[ArcLogEvent], filter: &CompiledFilter) -> Vec<ArcLogEvent> {
    events
        .iter()
        .filter(|e| filter.matches(e))
        .cloned()
        .collect()
}

/// Stable sort by timestamp; ingest order is not guaranteed monotonic
pub fn sort_by_timestamp(events: &mut [ArcLogEvent]) {
    events.sort_by_key(|e| e.timestamp);
}
