//! # vmclient
//!
//! Blocking client for the VictoriaMetrics HTTP API.
//!
//! vmclient checks server health, pushes samples to the Prometheus
//! text-format import endpoint, and runs instant and range queries, turning
//! the JSON wire format into typed results and a classified error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vmclient::{Client, Config, Context, DEFAULT_STEP};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Context::with_timeout(std::time::Duration::from_secs(10));
//! let client = Client::connect(&ctx, Config::new("http://127.0.0.1:8428")
//!     .with_extra_labels(r#"instance="web1""#))?;
//!
//! client.push_gauge(&ctx, r#"queue_depth{queue="high"}"#, 12.0)?;
//!
//! for series in client.instant_query(&ctx, "queue_depth", chrono::Utc::now(), DEFAULT_STEP)? {
//!     println!("{series} = {}", series.value());
//! }
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`VmClientError`]. Branch on [`VmClientError::kind`]:
//! a malformed query comes back as [`ErrorKind::Query`] with the server's
//! message, other non-200 responses as [`ErrorKind::UnexpectedResponse`]
//! with the raw body attached.
//!
//! ## Modules
//!
//! - [`client`]: Configuration, construction, public operations
//! - [`request`]: Endpoint paths, query strings, deadline propagation
//! - [`classify`]: Status-code driven error classification
//! - [`decode`]: Instant and range result decoding
//! - [`model`]: Label sets and result types
//! - [`push`]: Sample sets and the import endpoint
//! - [`transport`]: Pluggable HTTP transport
//! - [`context`]: Per-call deadline and cancellation
//! - [`observe`]: Span hooks for observability
//! - [`error`]: Error types

pub mod classify;
pub mod client;
pub mod context;
pub mod decode;
pub mod error;
pub mod model;
pub mod observe;
pub mod push;
pub mod request;
pub mod transport;

// Re-export primary API types at crate root for convenience.
pub use client::{Client, ClientBuilder, Config, DEFAULT_ENDPOINT, DEFAULT_STEP};
pub use context::Context;
pub use error::{ErrorKind, ResponseError, Result, VmClientError};
pub use model::{Instant, LABEL_FOR_NAME, LabelSet, Range, Sample};
pub use observe::{NoopObserver, Observer, TracingObserver};
pub use push::MetricSet;
pub use request::DEFAULT_PUSH_ENDPOINT;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
