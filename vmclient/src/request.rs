//! Outbound request construction.
//!
//! Turns an [`Operation`] and its [`RequestParams`] into an [`HttpRequest`]:
//! endpoint path, query string, deadline-derived `timeout`, and the client's
//! static headers. No network I/O happens here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use url::Url;

use crate::context::Context;
use crate::error::BuildError;
use crate::transport::HttpRequest;

/// Path segments of the health-check endpoint.
pub const HEALTH_PATH: &[&str] = &["-", "healthy"];

/// Path segments of the instant-query endpoint.
pub const INSTANT_PATH: &[&str] = &["prometheus", "api", "v1", "query"];

/// Path segments of the range-query endpoint.
pub const RANGE_PATH: &[&str] = &["prometheus", "api", "v1", "query_range"];

/// Path of the Prometheus text-format import endpoint.
pub const DEFAULT_PUSH_ENDPOINT: &str = "/api/v1/import/prometheus";

/// A read operation against the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Liveness check.
    Health,
    /// Instant query.
    Instant,
    /// Range query.
    Range,
}

impl Operation {
    /// The span/operation name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "ping",
            Self::Instant => "instant",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" | "health" => Ok(Self::Health),
            "instant" => Ok(Self::Instant),
            "range" => Ok(Self::Range),
            other => Err(BuildError::UnknownOperation(other.to_string())),
        }
    }
}

/// Parameters for a query request. Fields irrelevant to an operation are ignored.
#[derive(Debug, Clone, Default)]
pub struct RequestParams<'a> {
    /// Query expression.
    pub query: &'a str,
    /// Evaluation time of an instant query.
    pub when: DateTime<Utc>,
    /// Start of a range query.
    pub start: DateTime<Utc>,
    /// End of a range query.
    pub end: DateTime<Utc>,
    /// Resolution step.
    pub step: Duration,
}

/// Builds requests against one base endpoint with a fixed header set.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    base: &'a Url,
    headers: &'a HeaderMap,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a builder for `base` that attaches `headers` to every request.
    pub fn new(base: &'a Url, headers: &'a HeaderMap) -> Self {
        Self { base, headers }
    }

    /// Builds the request for `operation`.
    ///
    /// When `ctx` carries a deadline, the remaining time is sent as the
    /// `timeout` parameter and also bounds the transport call.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::CannotBeABase` if the base URL cannot take path segments.
    pub fn build(
        &self,
        ctx: &Context,
        operation: Operation,
        params: &RequestParams<'_>,
    ) -> Result<HttpRequest, BuildError> {
        let remaining = ctx.remaining();

        let url = match operation {
            Operation::Health => self.endpoint(HEALTH_PATH)?,
            Operation::Instant => {
                let mut url = self.endpoint(INSTANT_PATH)?;
                {
                    let mut args = url.query_pairs_mut();
                    args.append_pair("query", params.query)
                        .append_pair("time", &params.when.timestamp().to_string())
                        .append_pair("step", &format_duration(params.step));
                    if let Some(remaining) = remaining {
                        args.append_pair("timeout", &format_duration(remaining));
                    }
                }
                url
            }
            Operation::Range => {
                let mut url = self.endpoint(RANGE_PATH)?;
                {
                    let mut args = url.query_pairs_mut();
                    args.append_pair("query", params.query)
                        .append_pair("start", &params.start.timestamp().to_string())
                        .append_pair("end", &params.end.timestamp().to_string())
                        .append_pair("step", &format_duration(params.step));
                    if let Some(remaining) = remaining {
                        args.append_pair("timeout", &format_duration(remaining));
                    }
                }
                url
            }
        };

        let mut request = HttpRequest::get(url);
        request.headers = self.headers.clone();
        request.timeout = remaining;
        Ok(request)
    }

    /// The import endpoint for pushes.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::CannotBeABase` if the base URL cannot take path segments.
    pub fn push_endpoint(&self) -> Result<Url, BuildError> {
        let segments: Vec<&str> = DEFAULT_PUSH_ENDPOINT
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        self.endpoint(&segments)
    }

    /// Joins `segments` onto the base URL path.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::CannotBeABase` if the base URL cannot take path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, BuildError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| BuildError::CannotBeABase {
                url: self.base.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Renders a duration in the `1h2m3.5s` unit syntax the server parses.
///
/// Precision is one millisecond. Durations under a second render as `250ms`;
/// zero renders as `0s`. Whole hours and minutes keep their trailing units,
/// so five minutes is `5m0s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&seconds.to_string());
    if millis > 0 {
        let fraction = format!("{millis:03}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('s');
    out
}
