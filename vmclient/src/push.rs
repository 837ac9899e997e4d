//! Pushing samples to the import endpoint.
//!
//! Exposition-format serialization belongs to the metrics collector, not to
//! this crate. A [`MetricSet`] knows how to list its metric names and how to
//! push itself to a destination; the client only supplies the endpoint,
//! headers, extra labels and its transport. [`prometheus::Registry`] is the
//! provided implementation.

use std::collections::HashMap;

use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};
use promql_parser::label::MatchOp;
use promql_parser::parser::{self, Expr, VectorSelector};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use crate::classify::classify_push;
use crate::context::Context;
use crate::error::{PushError, Result};
use crate::model::LABEL_FOR_NAME;
use crate::transport::{HttpRequest, Transport};

/// Options handed to a [`MetricSet`] when pushing.
#[derive(Debug, Clone)]
pub struct PushOptions<'a> {
    /// Labels in `name="value",...` form to add to every pushed sample.
    pub extra_labels: &'a str,
    /// Headers to send with the push.
    pub headers: &'a HeaderMap,
    /// HTTP method to use.
    pub method: Method,
}

/// A collection of samples that can push itself.
pub trait MetricSet {
    /// Names of every metric in the set.
    fn metric_names(&self) -> Vec<String>;

    /// Serializes the set and sends it to `destination` through `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be encoded, the context is done,
    /// the transport fails, or the server rejects the payload.
    fn push_metrics(
        &self,
        ctx: &Context,
        destination: &Url,
        options: &PushOptions<'_>,
        transport: &dyn Transport,
    ) -> Result<()>;
}

impl MetricSet for Registry {
    fn metric_names(&self) -> Vec<String> {
        self.gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect()
    }

    fn push_metrics(
        &self,
        ctx: &Context,
        destination: &Url,
        options: &PushOptions<'_>,
        transport: &dyn Transport,
    ) -> Result<()> {
        let encoder = TextEncoder::new();
        let mut body = Vec::new();
        encoder
            .encode(&self.gather(), &mut body)
            .map_err(|e| PushError::Encode { source: e })?;

        let mut url = destination.clone();
        let extra = parse_labels(options.extra_labels)?;
        if !extra.is_empty() {
            let mut args = url.query_pairs_mut();
            for (name, value) in &extra {
                args.append_pair("extra_label", &format!("{name}={value}"));
            }
        }

        let mut headers = options.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));

        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let request = HttpRequest {
            method: options.method.clone(),
            url,
            headers,
            body: Some(body),
            timeout: ctx.remaining(),
        };
        classify_push(transport.send(request)?)
    }
}

/// Builds a one-gauge set. `name` may carry labels: `jobs{queue="high"}`.
///
/// # Errors
///
/// Returns `PushError` if the name or its labels are invalid.
pub fn gauge_set(name: &str, value: f64) -> std::result::Result<Registry, PushError> {
    let gauge = Gauge::with_opts(metric_opts(name)?).map_err(|e| PushError::Encode { source: e })?;
    gauge.set(value);
    single(Box::new(gauge))
}

/// Builds a one-counter set. `name` may carry labels: `requests{code="200"}`.
///
/// # Errors
///
/// Returns `PushError` if the name or its labels are invalid.
pub fn counter_set(name: &str, value: u64) -> std::result::Result<Registry, PushError> {
    let counter =
        IntCounter::with_opts(metric_opts(name)?).map_err(|e| PushError::Encode { source: e })?;
    counter.inc_by(value);
    single(Box::new(counter))
}

fn single(collector: Box<dyn prometheus::core::Collector>) -> std::result::Result<Registry, PushError> {
    let registry = Registry::new();
    registry
        .register(collector)
        .map_err(|e| PushError::Encode { source: e })?;
    Ok(registry)
}

fn metric_opts(name: &str) -> std::result::Result<Opts, PushError> {
    let (metric, labels) = split_metric_name(name)?;
    let const_labels: HashMap<String, String> = labels.into_iter().collect();
    Ok(Opts::new(metric.clone(), metric).const_labels(const_labels))
}

/// Splits a selector such as `name{a="b"}` into the bare name and its labels.
///
/// Labels come back sorted by name.
///
/// # Errors
///
/// Returns `PushError::MalformedLabels` if `name` is not a plain metric
/// selector with `=` matchers only.
pub fn split_metric_name(
    name: &str,
) -> std::result::Result<(String, Vec<(String, String)>), PushError> {
    let selector = parse_selector(name, name)?;
    let labels = equality_labels(name, &selector)?;
    let metric = selector
        .name
        .clone()
        .or_else(|| {
            selector
                .matchers
                .matchers
                .iter()
                .find(|m| m.name == LABEL_FOR_NAME)
                .map(|m| m.value.clone())
        })
        .ok_or_else(|| malformed(name, "missing metric name"))?;
    Ok((metric, labels))
}

/// Parses `a="1", b="2"` into pairs sorted by name.
///
/// Uses selector syntax, so values are double-quoted and may carry escapes.
/// An empty string yields no labels.
///
/// # Errors
///
/// Returns `PushError::MalformedLabels` if the text is not a matcher list or
/// uses an operator other than `=`.
pub fn parse_labels(input: &str) -> std::result::Result<Vec<(String, String)>, PushError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    let selector = parse_selector(input, &format!("{{{input}}}"))?;
    equality_labels(input, &selector)
}

fn parse_selector(input: &str, text: &str) -> std::result::Result<VectorSelector, PushError> {
    match parser::parse(text) {
        Ok(Expr::VectorSelector(selector)) => Ok(selector),
        Ok(_) => Err(malformed(input, "expected a metric selector")),
        Err(e) => Err(malformed(input, &e.to_string())),
    }
}

/// Collects `name="value"` matchers, skipping the metric name itself.
fn equality_labels(
    input: &str,
    selector: &VectorSelector,
) -> std::result::Result<Vec<(String, String)>, PushError> {
    let mut labels = Vec::new();
    for matcher in &selector.matchers.matchers {
        if !matches!(matcher.op, MatchOp::Equal) {
            return Err(malformed(
                input,
                &format!("label '{}' must use '='", matcher.name),
            ));
        }
        if matcher.name != LABEL_FOR_NAME {
            labels.push((matcher.name.clone(), matcher.value.clone()));
        }
    }
    labels.sort();
    Ok(labels)
}

fn malformed(input: &str, reason: &str) -> PushError {
    PushError::MalformedLabels {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
