//! Import progress metric.
//!
//! A single prometheus counter vector, `import_progress`, labelled by owner.
//! Each owner's counter only ever grows: updates carry the latest observed
//! percentage and the counter is bumped by the positive difference.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use imgport_core::error::{ImportError, Result};
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Metric name exported to prometheus.
pub const PROGRESS_METRIC_NAME: &str = "import_progress";

/// Label carrying the owner id.
pub const OWNER_LABEL: &str = "ownerUID";

static GLOBAL: OnceLock<Result<Arc<ProgressMetric>>> = OnceLock::new();

/// Owner-keyed monotonic progress counter.
pub struct ProgressMetric {
    counters: CounterVec,
    /// Per-owner handles; the map entry lock serialises read-then-add for one
    /// owner without touching other owners' shards.
    owners: DashMap<String, Counter>,
}

impl std::fmt::Debug for ProgressMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMetric")
            .field("owners", &self.owners.len())
            .finish()
    }
}

impl ProgressMetric {
    /// Create an unregistered metric.
    pub fn new() -> Result<Self> {
        let opts = Opts::new(PROGRESS_METRIC_NAME, "The import progress in percentage");
        let counters = CounterVec::new(opts, &[OWNER_LABEL])
            .map_err(|e| ImportError::Other(format!("failed to create progress metric: {}", e)))?;
        Ok(Self {
            counters,
            owners: DashMap::new(),
        })
    }

    /// Register with `registry`.
    ///
    /// Fails when `registry` already holds an `import_progress` collector,
    /// including this one: updates through a second instance would never be
    /// exported, so share the registered instance instead.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.counters.clone()))
            .map_err(|e| match e {
                prometheus::Error::AlreadyReg => ImportError::ConfigError(format!(
                    "progress metric {} is already registered",
                    PROGRESS_METRIC_NAME
                )),
                e => ImportError::Other(format!("failed to register progress metric: {}", e)),
            })
    }

    /// Process-wide metric registered with the default prometheus registry.
    ///
    /// Created and registered once, on first use. A failed first
    /// registration is logged once and every call returns that error.
    pub fn global() -> Result<Arc<ProgressMetric>> {
        GLOBAL
            .get_or_init(|| {
                let registered = Self::new().and_then(|metric| {
                    metric.register(prometheus::default_registry())?;
                    Ok(Arc::new(metric))
                });
                if let Err(e) = &registered {
                    tracing::error!(
                        metric = PROGRESS_METRIC_NAME,
                        error = %e,
                        "Unable to register progress metric"
                    );
                }
                registered
            })
            .as_ref()
            .map(Arc::clone)
            .map_err(|e| ImportError::Other(e.to_string()))
    }

    /// Last recorded value for `owner` (0 when never updated).
    pub fn value(&self, owner: &str) -> f64 {
        self.owners.get(owner).map(|c| c.get()).unwrap_or(0.0)
    }

    /// Raise `owner`'s counter to `value`. Returns the delta applied, 0 when
    /// `value` is not above the recorded one.
    pub fn advance_to(&self, owner: &str, value: f64) -> f64 {
        let entry = self
            .owners
            .entry(owner.to_string())
            .or_insert_with(|| self.counters.with_label_values(&[owner]));
        let delta = value - entry.get();
        if value > 0.0 && delta > 0.0 {
            entry.inc_by(delta);
            delta
        } else {
            0.0
        }
    }
}

/// Render `registry` in the prometheus text exposition format.
pub fn render_text(registry: &Registry) -> Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .map_err(|e| ImportError::Other(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buf).map_err(|e| ImportError::SerializationError(e.to_string()))
}
