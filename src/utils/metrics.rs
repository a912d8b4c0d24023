//! Metrics sinks.
//!
//! Projections report view sizes after every batch they apply. The core
//! calls into a `MetricsSink` and never keeps process-wide counters of its
//! own. `OtelMetricsSink` (feature `otel`) records OTel gauges; naming
//! follows OTel semantic conventions (dot-separated).

/// Receiver of values emitted by the core.
pub trait MetricsSink: Send + Sync {
    /// Current number of rows in a projection's view.
    fn view_size(&self, projection: &str, view: &str, rows: u64);

    /// Number of events a projection applied in one batch.
    fn events_applied(&self, projection: &str, count: u64);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn view_size(&self, _projection: &str, _view: &str, _rows: u64) {}

    fn events_applied(&self, _projection: &str, _count: u64) {}
}

/// Sink that emits values as debug-level tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn view_size(&self, projection: &str, view: &str, rows: u64) {
        tracing::debug!(projection, view, rows, "palisade.view.rows");
    }

    fn events_applied(&self, projection: &str, count: u64) {
        tracing::debug!(projection, count, "palisade.projection.events");
    }
}

#[cfg(feature = "otel")]
pub use otel::OtelMetricsSink;

#[cfg(feature = "otel")]
mod otel {
    use std::sync::LazyLock;

    use opentelemetry::metrics::{Counter, Gauge, Meter};
    use opentelemetry::{global, KeyValue};

    use super::MetricsSink;

    static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("palisade"));

    /// Rows per materialized view.
    static VIEW_ROWS: LazyLock<Gauge<u64>> = LazyLock::new(|| {
        METER
            .u64_gauge("palisade.view.rows")
            .with_description("Rows in a materialized view")
            .build()
    });

    /// Events applied by projections.
    static PROJECTION_EVENTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
        METER
            .u64_counter("palisade.projection.events")
            .with_description("Events applied by projections")
            .build()
    });

    /// Create a projection label.
    fn projection_attr(projection: &str) -> KeyValue {
        KeyValue::new("projection", projection.to_string())
    }

    /// Create a view label.
    fn view_attr(view: &str) -> KeyValue {
        KeyValue::new("view", view.to_string())
    }

    /// Sink backed by the global OTel meter provider.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OtelMetricsSink;

    impl MetricsSink for OtelMetricsSink {
        fn view_size(&self, projection: &str, view: &str, rows: u64) {
            VIEW_ROWS.record(rows, &[projection_attr(projection), view_attr(view)]);
        }

        fn events_applied(&self, projection: &str, count: u64) {
            PROJECTION_EVENTS.add(count, &[projection_attr(projection)]);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::MetricsSink;

    /// Sink recording the last value per `(projection, view)`.
    #[derive(Default)]
    pub struct RecordingMetricsSink {
        pub sizes: Mutex<HashMap<(String, String), u64>>,
        pub applied: Mutex<HashMap<String, u64>>,
    }

    impl RecordingMetricsSink {
        pub fn size(&self, projection: &str, view: &str) -> Option<u64> {
            self.sizes
                .lock()
                .unwrap()
                .get(&(projection.to_string(), view.to_string()))
                .copied()
        }
    }

    impl MetricsSink for RecordingMetricsSink {
        fn view_size(&self, projection: &str, view: &str, rows: u64) {
            self.sizes
                .lock()
                .unwrap()
                .insert((projection.to_string(), view.to_string()), rows);
        }

        fn events_applied(&self, projection: &str, count: u64) {
            *self
                .applied
                .lock()
                .unwrap()
                .entry(projection.to_string())
                .or_insert(0) += count;
        }
    }
}
