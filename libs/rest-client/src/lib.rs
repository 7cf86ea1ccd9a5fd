#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Generic REST client
//!
//! This crate wraps a hyper-based HTTP transport with:
//! - Default request options merged with per-call overrides
//! - Retries of transport failures with a fixed delay
//! - Request batching: queue requests, run them concurrently, get callbacks
//! - A bounded profiling log of request outcomes
//! - A registry of named service configurations
//! - Transparent response decompression and optional redirect following
//!
//! All shared state lives in a [`ClientContext`] owned by the caller; clients
//! built from clones of the same context share its profiling log and queue.
//!
//! Failures never escape as errors once a request is on the wire: a transport
//! failure becomes a [`Response`] whose `is_success()` is false. Malformed
//! input (an empty or invalid URL, a bad header) is reported as
//! [`Dispatch::Aborted`] and never reaches the transport.
//!
//! # Example
//!
//! ```ignore
//! use rest_client::{ClientContext, Params, RestClient};
//!
//! let context = ClientContext::new();
//! let client = RestClient::builder(context.clone()).retries_max(3).build()?;
//!
//! // single mode
//! let response = client
//!     .get("https://api.example.com/search")
//!     .query(Params::new().with("q", "rust"))
//!     .send()
//!     .await
//!     .into_response();
//!
//! // queue mode
//! let mut batch = client.clone();
//! batch.set_queue_enabled(true);
//! for id in 1..=3 {
//!     batch
//!         .get(&format!("https://api.example.com/items/{id}"))
//!         .on_complete(move |r| println!("{id}: {}", r.http_code()))
//!         .send()
//!         .await;
//! }
//! context.process_queue().await;
//! ```

mod client;
mod config;
mod context;
mod error;
mod options;
mod params;
mod profiling;
mod queue;
mod request;
mod response;
mod retry;
pub mod transport;

pub use client::{ClientBuilder, Dispatch, RestClient};
pub use config::{
    ClientConfig, DEFAULT_USER_AGENT, ENV_PREFIX, ServiceConfig, ServicesConfig, Settings,
    TlsRootConfig, TransportSecurity, default_headers,
};
pub use context::ClientContext;
pub use error::{RestError, TransportError, TransportErrorKind};
pub use options::{AuthScheme, Body, Credentials, HeaderSet, RequestOptions};
pub use params::{ParamValue, Params, UrlParams, array_to_url_params, build_query};
pub use profiling::{DEFAULT_PROFILING_MAX, ProfilingEntry, ProfilingLog};
pub use queue::Callback;
pub use request::RequestBuilder;
pub use response::{MetaValue, QueueMode, Response, TransferInfo};
pub use retry::RetryPolicy;
pub use transport::{HyperTransport, HyperTransportBuilder, PreparedRequest, RawResponse, Transport};
