//! qemu-img progress extraction.
//!
//! `qemu-img convert -p` prints `    (45.34/100%)` and rewrites it in place.
//! Each line handed to [`ProgressReporter::on_line`] is scanned for that
//! pattern and the owner's progress metric is raised to the new value.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::metrics::ProgressMetric;

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((\d?\d\.\d\d)/100%\)").expect("valid progress pattern"))
}

/// Extract the percentage from a progress line, if it carries one.
pub fn parse_progress(line: &str) -> Option<f64> {
    progress_pattern()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Feeds progress lines into the metric for one owner.
///
/// Without an owner the lines are still parsed but nothing is recorded.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    owner: Option<String>,
    metric: Arc<ProgressMetric>,
}

impl ProgressReporter {
    /// An empty owner disables recording.
    pub fn new(owner: Option<&str>, metric: Arc<ProgressMetric>) -> Self {
        Self {
            owner: owner.filter(|o| !o.is_empty()).map(str::to_string),
            metric,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn metric(&self) -> &Arc<ProgressMetric> {
        &self.metric
    }

    pub fn on_line(&self, line: &str) {
        let Some(value) = parse_progress(line) else {
            return;
        };
        let Some(owner) = self.owner.as_deref() else {
            return;
        };
        let delta = self.metric.advance_to(owner, value);
        tracing::trace!(owner, progress = value, delta, "Import progress");
    }
}
