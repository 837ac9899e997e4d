//! Pluggable HTTP transport.
//!
//! The client needs only "send a request, get back a status and a readable
//! body, honour a per-call timeout". [`Transport`] captures exactly that, so
//! callers can substitute their own implementation for testing or for custom
//! TLS trust. [`ReqwestTransport`] is the default.

use std::fmt;
use std::io::Read;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{BuildError, TransportError};

/// A fully-formed outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL including the query string.
    pub url: Url,
    /// Headers to send.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
    /// Time the transport may spend on this request, if bounded.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// A bodyless GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// The body stream. Read at most once.
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Wraps an in-memory body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: Box::new(std::io::Cursor::new(body.into())),
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends requests on behalf of a client.
///
/// Implementations must be safe to call from several threads at once; the
/// client itself holds no per-call state.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and returns the response head with an unread body.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if no response was received.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Releases idle pooled connections. Must be idempotent.
    fn close_idle(&self) {}
}

/// Options for the default transport.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Skip TLS certificate verification for this transport only.
    pub insecure: bool,
    /// Upper bound on any single request, independent of call deadlines.
    pub request_timeout: Option<Duration>,
}

/// Default transport backed by a blocking reqwest client.
///
/// TLS settings are scoped to this instance; no process-wide state is touched.
pub struct ReqwestTransport {
    config: TransportConfig,
    client: RwLock<reqwest::blocking::Client>,
}

impl ReqwestTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::ClientCreate` if the TLS backend cannot be initialised.
    pub fn new(config: TransportConfig) -> Result<Self, BuildError> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client: RwLock::new(client),
        })
    }

    fn client(&self) -> reqwest::blocking::Client {
        // reqwest clients are reference counted; cloning shares the pool.
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn build_client(config: &TransportConfig) -> Result<reqwest::blocking::Client, BuildError> {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(concat!("vmclient/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(config.insecure);
    // The blocking client defaults to a 30s timeout; only call deadlines and
    // an explicit ceiling should bound a request.
    builder = builder.timeout(config.request_timeout);
    builder
        .build()
        .map_err(|e| BuildError::ClientCreate { source: e })
}

/// Whether the caller's deadline, rather than the transport's own ceiling,
/// is what bounds a request.
fn deadline_governs(deadline: Option<Duration>, ceiling: Option<Duration>) -> bool {
    match (deadline, ceiling) {
        (Some(deadline), Some(ceiling)) => deadline <= ceiling,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let deadline_bound = deadline_governs(request.timeout, self.config.request_timeout);
        let mut builder = self
            .client()
            .request(request.method, request.url)
            .headers(request.headers);
        // A per-request timeout replaces the client-wide one, so apply the shorter.
        let bound = match (request.timeout, self.config.request_timeout) {
            (Some(deadline), Some(ceiling)) => Some(deadline.min(ceiling)),
            (deadline, ceiling) => deadline.or(ceiling),
        };
        if let Some(bound) = bound {
            builder = builder.timeout(bound);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() && deadline_bound {
                TransportError::DeadlineExceeded
            } else {
                TransportError::Request { source: e }
            }
        })?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: Box::new(response),
        })
    }

    fn close_idle(&self) {
        // Swapping in a fresh client drops the old pool once in-flight
        // requests holding a clone of it finish.
        match build_client(&self.config) {
            Ok(fresh) => match self.client.write() {
                Ok(mut guard) => *guard = fresh,
                Err(poisoned) => *poisoned.into_inner() = fresh,
            },
            Err(e) => tracing::warn!(error = %e, "failed to recycle connection pool"),
        }
    }
}
