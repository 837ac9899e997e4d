//! Observability hooks for client operations.
//!
//! Every operation opens one span through the client's [`Observer`], adds
//! attributes and events as it progresses, and records either an error or a
//! final ok status before the span is dropped. The default [`NoopObserver`]
//! discards everything; [`TracingObserver`] forwards to the `tracing` crate.

use std::fmt;
use std::time::Instant;

/// Name reported as `db.system` on every span.
pub const DB_SYSTEM: &str = "Victoria Metrics";

/// Creates spans for client operations.
pub trait Observer: Send + Sync + fmt::Debug {
    /// Opens a span for `operation` with initial `attributes`.
    fn start(&self, operation: &'static str, attributes: &[(&'static str, String)])
    -> Box<dyn ObservedSpan>;
}

/// An open span. Ends when dropped.
pub trait ObservedSpan: Send {
    /// Adds or replaces an attribute.
    fn set_attribute(&mut self, key: &'static str, value: String);

    /// Records a point-in-time event.
    fn add_event(&mut self, name: &'static str);

    /// Marks the span as failed.
    fn record_error(&mut self, error: &dyn std::error::Error);

    /// Marks the span as succeeded.
    fn set_ok(&mut self, message: &'static str);
}

/// Observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

struct NoopSpan;

impl ObservedSpan for NoopSpan {
    fn set_attribute(&mut self, _key: &'static str, _value: String) {}
    fn add_event(&mut self, _name: &'static str) {}
    fn record_error(&mut self, _error: &dyn std::error::Error) {}
    fn set_ok(&mut self, _message: &'static str) {}
}

impl Observer for NoopObserver {
    fn start(
        &self,
        _operation: &'static str,
        _attributes: &[(&'static str, String)],
    ) -> Box<dyn ObservedSpan> {
        Box::new(NoopSpan)
    }
}

/// Observer that emits `tracing` events at span start, on each event, and
/// at span end.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn start(
        &self,
        operation: &'static str,
        attributes: &[(&'static str, String)],
    ) -> Box<dyn ObservedSpan> {
        let attributes = attributes.to_vec();
        tracing::debug!(
            operation,
            attributes = %render_attributes(&attributes),
            "span started"
        );
        Box::new(TracingSpan {
            operation,
            attributes,
            started: Instant::now(),
            status: SpanStatus::Unset,
        })
    }
}

#[derive(Debug)]
enum SpanStatus {
    Unset,
    Ok(&'static str),
    Error(String),
}

struct TracingSpan {
    operation: &'static str,
    attributes: Vec<(&'static str, String)>,
    started: Instant,
    status: SpanStatus,
}

impl ObservedSpan for TracingSpan {
    fn set_attribute(&mut self, key: &'static str, value: String) {
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    fn add_event(&mut self, name: &'static str) {
        tracing::trace!(operation = self.operation, event = name);
    }

    fn record_error(&mut self, error: &dyn std::error::Error) {
        self.status = SpanStatus::Error(error.to_string());
    }

    fn set_ok(&mut self, message: &'static str) {
        self.status = SpanStatus::Ok(message);
    }
}

impl Drop for TracingSpan {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let attributes = render_attributes(&self.attributes);
        match &self.status {
            SpanStatus::Error(error) => tracing::warn!(
                operation = self.operation,
                elapsed_ms,
                attributes = %attributes,
                error = %error,
                "span failed"
            ),
            SpanStatus::Ok(message) => tracing::debug!(
                operation = self.operation,
                elapsed_ms,
                attributes = %attributes,
                status = message,
                "span finished"
            ),
            SpanStatus::Unset => tracing::debug!(
                operation = self.operation,
                elapsed_ms,
                attributes = %attributes,
                "span finished"
            ),
        }
    }
}

fn render_attributes(attributes: &[(&'static str, String)]) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_span_accepts_everything() {
        let mut span = NoopObserver.start("ping", &[("db.system", DB_SYSTEM.to_string())]);
        span.set_attribute("step", "5m0s".to_string());
        span.add_event("request performed");
        span.record_error(&std::io::Error::other("boom"));
        span.set_ok("done");
    }

    #[test]
    fn test_tracing_span_replaces_attributes() {
        let mut span = TracingSpan {
            operation: "instant",
            attributes: vec![("step", "1m0s".to_string())],
            started: Instant::now(),
            status: SpanStatus::Unset,
        };
        span.set_attribute("step", "5m0s".to_string());
        span.set_attribute("db.query.text", "up".to_string());
        assert_eq!(span.attributes.len(), 2);
        assert_eq!(span.attributes[0].1, "5m0s");

        span.record_error(&std::io::Error::other("boom"));
        assert!(matches!(&span.status, SpanStatus::Error(e) if e == "boom"));
    }

    #[test]
    fn test_render_attributes() {
        let rendered = render_attributes(&[("a", "1".to_string()), ("b", "x y".to_string())]);
        assert_eq!(rendered, r#"a="1" b="x y""#);
    }
}
