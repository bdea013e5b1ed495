//! Document options, loadable from serde sources or environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

pub const UNDO_DEPTH_ENV: &str = "DOC_UNDO_DEPTH";
pub const HISTORY_EVENT_DELAY_ENV: &str = "DOC_HISTORY_EVENT_DELAY_MS";
pub const SELECTIONS_MAY_TOUCH_ENV: &str = "DOC_SELECTIONS_MAY_TOUCH";
pub const LINE_HEIGHT_ENV: &str = "DOC_LINE_HEIGHT";

/// Longest coalescing window accepted from the environment.
pub const MAX_HISTORY_EVENT_DELAY_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Maximum number of change events kept on the undo stack.
    pub undo_depth: usize,
    /// Window within which `+`-prefixed edits of the same origin coalesce.
    pub history_event_delay_ms: u64,
    /// Keep adjacent non-empty selection ranges apart instead of merging them.
    pub selections_may_touch: bool,
    /// Height given to freshly created lines.
    pub line_height: f64,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            undo_depth: 200,
            history_event_delay_ms: 1250,
            selections_may_touch: false,
            line_height: 1.0,
        }
    }
}

impl DocumentOptions {
    /// Defaults overridden by any `DOC_*` environment variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`DocumentOptions::from_env`] but reads values through `lookup`.
    /// Unparseable or out-of-range values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        match parse_value::<usize, _>(&lookup, UNDO_DEPTH_ENV) {
            Some(0) => warn!(key = UNDO_DEPTH_ENV, "undo depth must be at least 1; keeping default"),
            Some(depth) => options.undo_depth = depth,
            None => {}
        }
        match parse_value::<u64, _>(&lookup, HISTORY_EVENT_DELAY_ENV) {
            Some(delay) if delay > MAX_HISTORY_EVENT_DELAY_MS => warn!(
                key = HISTORY_EVENT_DELAY_ENV,
                delay,
                max = MAX_HISTORY_EVENT_DELAY_MS,
                "history event delay too large; keeping default"
            ),
            Some(delay) => options.history_event_delay_ms = delay,
            None => {}
        }
        if let Some(raw) = lookup(SELECTIONS_MAY_TOUCH_ENV) {
            match parse_env_flag(&raw) {
                Some(flag) => options.selections_may_touch = flag,
                None => warn!(key = SELECTIONS_MAY_TOUCH_ENV, value = %raw, "ignoring unrecognized flag"),
            }
        }
        if let Some(height) = parse_value::<f64, _>(&lookup, LINE_HEIGHT_ENV) {
            if height.is_finite() && height >= 0.0 {
                options.line_height = height;
            } else {
                warn!(key = LINE_HEIGHT_ENV, height, "ignoring invalid line height");
            }
        }
        options
    }

    pub fn history_event_delay(&self) -> Duration {
        Duration::from_millis(self.history_event_delay_ms)
    }
}

fn parse_value<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable option");
            None
        }
    }
}

/// Parse a boolean-like flag value.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsy: `0`, `false`, `no`, `off` and the
/// empty string. Matching ignores case and surrounding whitespace.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
