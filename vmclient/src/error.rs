//! Error types for the vmclient query and import client.

use std::fmt;

use thiserror::Error;

/// Machine-checkable classification of a [`VmClientError`].
///
/// Callers branch on this tag instead of matching error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local request construction failed; nothing reached the network.
    Build,
    /// The request never produced a response (network, TLS, deadline, cancel).
    Transport,
    /// The server rejected the query text (HTTP 422 with a structured body).
    Query,
    /// Any other non-200 status, or a 422 whose body is not the expected shape.
    UnexpectedResponse,
    /// A 200 response whose body does not match the expected envelope.
    Decode,
    /// The sample set could not be prepared for pushing.
    Push,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Build => "build error",
            Self::Transport => "transport error",
            Self::Query => "query error",
            Self::UnexpectedResponse => "unexpected response",
            Self::Decode => "decode error",
            Self::Push => "push error",
        };
        f.write_str(name)
    }
}

/// The main error type for all client operations.
#[derive(Error, Debug)]
pub enum VmClientError {
    /// Error constructing a request or the client itself.
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Error sending the request or receiving the response.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a status other than 200.
    #[error("{0}")]
    Response(#[from] ResponseError),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The sample set could not be prepared for pushing.
    #[error("push error: {0}")]
    Push(#[from] PushError),
}

impl VmClientError {
    /// Returns the classification tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(_) => ErrorKind::Build,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Response(e) => e.kind(),
            Self::Decode(_) => ErrorKind::Decode,
            Self::Push(_) => ErrorKind::Push,
        }
    }

    /// Returns the HTTP status code if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Returns the raw response body if one was received and read.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Response(e) => Some(e.response()),
            _ => None,
        }
    }

    /// Returns the underlying [`ResponseError`], if this is one.
    pub fn as_response(&self) -> Option<&ResponseError> {
        match self {
            Self::Response(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while building the client or an outbound request.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The configured base address is not a valid URL.
    #[error("invalid endpoint '{url}': {source}")]
    InvalidUrl {
        /// The address as configured.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The base address uses a scheme other than http or https.
    #[error("unsupported scheme '{scheme}' in endpoint '{url}'")]
    UnsupportedScheme {
        /// The address as configured.
        url: String,
        /// The offending scheme.
        scheme: String,
    },

    /// The base address cannot have path segments appended to it.
    #[error("endpoint '{url}' cannot be used as a base URL")]
    CannotBeABase {
        /// The address as configured.
        url: String,
    },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// The header name.
        name: String,
        /// Why the header is invalid.
        reason: String,
    },

    /// An operation name does not correspond to any endpoint.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// The default HTTP transport could not be created.
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by the transport before a response was received.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The HTTP request failed.
    #[error("HTTP request failed: {source}")]
    Request {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// An I/O failure while talking to the server.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The caller's deadline passed before the call could complete.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the context.
    #[error("context cancelled")]
    Cancelled,
}

/// A classified non-200 response.
///
/// Carries the HTTP status, a human-readable message, the raw body (empty if
/// it could not be read) and, where applicable, the lower-level cause. Built
/// once at the point of classification and never mutated afterwards.
#[derive(Error, Debug)]
#[error("{code} - {message}")]
pub struct ResponseError {
    kind: ErrorKind,
    code: u16,
    message: String,
    response: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ResponseError {
    /// A query the server refused to evaluate.
    pub fn query(code: u16, message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Query,
            code,
            message: message.into(),
            response: response.into(),
            source: None,
        }
    }

    /// Any response the client does not know how to handle.
    pub fn unexpected(code: u16, message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UnexpectedResponse,
            code,
            message: message.into(),
            response: response.into(),
            source: None,
        }
    }

    /// Attaches the lower-level cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Either [`ErrorKind::Query`] or [`ErrorKind::UnexpectedResponse`].
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The HTTP status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The server-supplied or generic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw response body.
    pub fn response(&self) -> &str {
        &self.response
    }
}

/// Errors raised while decoding a successful response body.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The body is not valid JSON of the expected envelope shape.
    #[error("malformed response body: {source}")]
    Json {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The envelope status is not `success`.
    #[error("wrong status: {status}")]
    WrongStatus {
        /// The status the server reported.
        status: String,
    },

    /// The first pair element is not a number.
    #[error("error parsing {value} as float64 timestamp")]
    TimestampType {
        /// The offending JSON element.
        value: serde_json::Value,
    },

    /// The timestamp does not fit the supported time range.
    #[error("timestamp {seconds} is out of range")]
    TimestampRange {
        /// The timestamp in seconds.
        seconds: f64,
    },

    /// The second pair element is not a string.
    #[error("error typecasting {value} to string")]
    ValueType {
        /// The offending JSON element.
        value: serde_json::Value,
    },

    /// The second pair element is a string but not a decimal number.
    #[error("error parsing value {value}: {source}")]
    ValueParse {
        /// The string as received.
        value: String,
        /// The underlying parse error.
        #[source]
        source: std::num::ParseFloatError,
    },

    /// A range sample is not a `[timestamp, value]` pair.
    #[error("exactly two parameters are expected, instead of {len}: {values:?}")]
    Arity {
        /// Number of elements found.
        len: usize,
        /// The elements as received.
        values: Vec<serde_json::Value>,
    },
}

/// Errors raised while preparing a sample set for pushing.
#[derive(Error, Debug)]
pub enum PushError {
    /// The metrics collector rejected a metric or failed to encode.
    #[error("failed to encode metrics: {source}")]
    Encode {
        /// The underlying collector error.
        #[source]
        source: prometheus::Error,
    },

    /// A label list is not in `name="value",...` form.
    #[error("malformed labels '{input}': {reason}")]
    MalformedLabels {
        /// The label text as given.
        input: String,
        /// Why it could not be parsed.
        reason: String,
    },
}

/// Type alias for `Result<T, VmClientError>`.
pub type Result<T> = std::result::Result<T, VmClientError>;
