//! The client façade: configuration, construction and the public operations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::{classify, classify_health};
use crate::context::Context;
use crate::decode::{decode_instant, decode_range};
use crate::error::{BuildError, Result};
use crate::model::{Instant, Range};
use crate::observe::{DB_SYSTEM, NoopObserver, ObservedSpan, Observer};
use crate::push::{MetricSet, PushOptions, counter_set, gauge_set};
use crate::request::{Operation, RequestBuilder, RequestParams, format_duration};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportConfig};

/// Address of a VictoriaMetrics single-node instance on its default port.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8428";

/// Step used when the caller has no preference.
pub const DEFAULT_STEP: Duration = Duration::from_secs(5 * 60);

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the server.
    pub address: String,
    /// Headers sent with every request (e.g., for authentication).
    pub headers: BTreeMap<String, String>,
    /// Labels in `name="value",...` form added to every pushed sample.
    pub extra_labels: String,
    /// Skip TLS certificate verification on the default transport.
    pub insecure: bool,
    /// Upper bound on any single request made by the default transport.
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl Config {
    /// Creates a config for `address` with no headers or extra labels.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            headers: BTreeMap::new(),
            extra_labels: String::new(),
            insecure: false,
            request_timeout: None,
        }
    }

    /// Adds an HTTP header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the labels added to every pushed sample.
    #[must_use]
    pub fn with_extra_labels(mut self, extra_labels: impl Into<String>) -> Self {
        self.extra_labels = extra_labels.into();
        self
    }

    /// Disables TLS certificate verification for this client.
    #[must_use]
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Sets the per-request ceiling of the default transport.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Assembles a [`Client`] with optional custom transport and observer.
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    observer: Arc<dyn Observer>,
}

impl ClientBuilder {
    /// Starts from `config` with the default transport and no observability.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Uses `transport` instead of the default reqwest-based one.
    ///
    /// The `insecure` and `request_timeout` settings only apply to the default
    /// transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reports every operation to `observer`.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Validates the configuration, then checks the server's health endpoint.
    ///
    /// No client is returned unless the health check succeeds.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` for a malformed address or header, or the health
    /// health check's error if the server is unreachable or unhealthy.
    pub fn connect(self, ctx: &Context) -> Result<Client> {
        let endpoint = parse_endpoint(&self.config.address)?;
        let headers = parse_headers(&self.config.headers)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(TransportConfig {
                insecure: self.config.insecure,
                request_timeout: self.config.request_timeout,
            })?),
        };

        let client = Client {
            endpoint,
            headers,
            extra_labels: self.config.extra_labels,
            transport,
            observer: self.observer,
        };
        client.health(ctx)?;
        tracing::debug!(endpoint = %client.endpoint, "connected");
        Ok(client)
    }
}

/// A connection to one VictoriaMetrics endpoint.
///
/// Holds no per-call state: every operation may run concurrently from
/// several threads against the same client. Clones share the transport.
#[derive(Clone)]
pub struct Client {
    endpoint: Url,
    headers: HeaderMap,
    extra_labels: String,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("extra_labels", &self.extra_labels)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connects with the default transport. Shorthand for
    /// `ClientBuilder::new(config).connect(ctx)`.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::connect`].
    pub fn connect(ctx: &Context, config: Config) -> Result<Self> {
        ClientBuilder::new(config).connect(ctx)
    }

    /// Starts building a client from `config`.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// The base URL requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Checks that the database accepts connections.
    ///
    /// # Errors
    ///
    /// Returns an unexpected-response error carrying the raw body for any
    /// status other than 200, or a transport error if no response arrived.
    pub fn health(&self, ctx: &Context) -> Result<()> {
        let mut span = self.start(Operation::Health.as_str(), Vec::new());
        let result = self
            .request(ctx, Operation::Health, &RequestParams::default())
            .and_then(classify_health);
        finish(span.as_mut(), result, "database responding")
    }

    /// Pushes every sample in `set` to the import endpoint.
    ///
    /// The client's headers and extra labels are handed to the set, which
    /// owns serialization.
    ///
    /// # Errors
    ///
    /// Returns the set's encoding error, a transport error, or an
    /// unexpected-response error if the server rejects the payload.
    pub fn push(&self, ctx: &Context, set: &dyn MetricSet) -> Result<()> {
        let header_names: Vec<&str> = self.headers.keys().map(HeaderName::as_str).collect();
        let mut span = self.start(
            "push",
            vec![
                ("extra_labels", self.extra_labels.clone()),
                ("metric.names", set.metric_names().join(",")),
                ("http.request.method", Method::POST.to_string()),
                ("http.request.header.names", header_names.join(",")),
            ],
        );

        let result = self
            .request_builder()
            .push_endpoint()
            .map_err(Into::into)
            .and_then(|destination| {
                let options = PushOptions {
                    extra_labels: &self.extra_labels,
                    headers: &self.headers,
                    method: Method::POST,
                };
                set.push_metrics(ctx, &destination, &options, self.transport.as_ref())
            });
        finish(span.as_mut(), result, "metrics are pushed")
    }

    /// Pushes a single gauge. `name` may carry labels: `temp{room="a"}`.
    ///
    /// # Errors
    ///
    /// See [`Client::push`]; also fails if `name` is not a valid metric.
    pub fn push_gauge(&self, ctx: &Context, name: &str, value: f64) -> Result<()> {
        let set = gauge_set(name, value)?;
        self.push(ctx, &set)
    }

    /// Pushes a single counter. `name` may carry labels: `jobs_total{queue="a"}`.
    ///
    /// # Errors
    ///
    /// See [`Client::push`]; also fails if `name` is not a valid metric.
    pub fn push_counter(&self, ctx: &Context, name: &str, value: u64) -> Result<()> {
        let set = counter_set(name, value)?;
        self.push(ctx, &set)
    }

    /// Evaluates `query` at `when`.
    ///
    /// # Errors
    ///
    /// Returns the first failure of request construction, transport,
    /// classification (422 becomes a query error) or decoding.
    pub fn instant_query(
        &self,
        ctx: &Context,
        query: &str,
        when: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Instant>> {
        let mut span = self.start(
            Operation::Instant.as_str(),
            vec![
                ("db.query.text", query.to_string()),
                ("time", when.to_rfc3339()),
                ("step", format_duration(step)),
            ],
        );
        let params = RequestParams {
            query,
            when,
            step,
            ..RequestParams::default()
        };
        let result = self
            .fetch(ctx, Operation::Instant, &params, span.as_mut())
            .and_then(|body| Ok(decode_instant(&body)?));
        if let Ok(data) = &result {
            span.set_attribute("result.count", data.len().to_string());
        }
        finish(span.as_mut(), result, "data received")
    }

    /// Evaluates `query` over `start..=end` at `step` resolution.
    ///
    /// # Errors
    ///
    /// Returns the first failure of request construction, transport,
    /// classification (422 becomes a query error) or decoding.
    pub fn range_query(
        &self,
        ctx: &Context,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Range>> {
        let mut span = self.start(
            Operation::Range.as_str(),
            vec![
                ("db.query.text", query.to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
                ("step", format_duration(step)),
            ],
        );
        let params = RequestParams {
            query,
            start,
            end,
            step,
            ..RequestParams::default()
        };
        let result = self
            .fetch(ctx, Operation::Range, &params, span.as_mut())
            .and_then(|body| Ok(decode_range(&body)?));
        if let Ok(data) = &result {
            span.set_attribute("result.count", data.len().to_string());
        }
        finish(span.as_mut(), result, "data received")
    }

    /// Releases idle pooled connections. Idempotent; the client stays usable.
    pub fn close(&self) {
        self.transport.close_idle();
    }

    fn request_builder(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(&self.endpoint, &self.headers)
    }

    fn start(
        &self,
        operation: &'static str,
        mut attributes: Vec<(&'static str, String)>,
    ) -> Box<dyn ObservedSpan> {
        attributes.insert(0, ("db.system.name", DB_SYSTEM.to_string()));
        attributes.insert(1, ("db.client.connection.pool.name", self.endpoint.to_string()));
        self.observer.start(operation, &attributes)
    }

    /// Builds and sends a request, then classifies the response.
    fn fetch(
        &self,
        ctx: &Context,
        operation: Operation,
        params: &RequestParams<'_>,
        span: &mut dyn ObservedSpan,
    ) -> Result<Vec<u8>> {
        let body = classify(self.request(ctx, operation, params)?)?;
        span.add_event("request performed");
        Ok(body)
    }

    fn request(
        &self,
        ctx: &Context,
        operation: Operation,
        params: &RequestParams<'_>,
    ) -> Result<HttpResponse> {
        let request = self.request_builder().build(ctx, operation, params)?;
        self.dispatch(ctx, request)
    }

    fn dispatch(&self, ctx: &Context, request: HttpRequest) -> Result<HttpResponse> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        tracing::trace!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request)?;
        tracing::trace!(status = response.status, "received response");
        Ok(response)
    }
}

/// Records the outcome on `span` and passes it through.
fn finish<T>(span: &mut dyn ObservedSpan, result: Result<T>, ok: &'static str) -> Result<T> {
    match &result {
        Ok(_) => span.set_ok(ok),
        Err(e) => span.record_error(e),
    }
    result
}

fn parse_endpoint(address: &str) -> std::result::Result<Url, BuildError> {
    let url = Url::parse(address).map_err(|e| BuildError::InvalidUrl {
        url: address.to_string(),
        source: e,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BuildError::UnsupportedScheme {
            url: address.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.cannot_be_a_base() {
        return Err(BuildError::CannotBeABase {
            url: address.to_string(),
        });
    }
    Ok(url)
}

fn parse_headers(headers: &BTreeMap<String, String>) -> std::result::Result<HeaderMap, BuildError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = |reason: String| BuildError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
