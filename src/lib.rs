//! reqline — asynchronous HTTP request engine.
//!
//! reqline multiplexes many in-flight HTTP requests onto one cooperative
//! engine backed by a libcurl multi handle. Callers build a request on any
//! thread, `send()` it, and either block on the returned handle or receive
//! a completion callback; no thread is spawned per request.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use reqline::{Performer, RequestBuilder, Status};
//!
//! fn main() -> Result<(), reqline::Error> {
//!     // Tick the engine from a background thread.
//!     let _performer = Performer::new()?;
//!
//!     let request = RequestBuilder::new("https://example.com/api")
//!         .header("Accept", "application/json")
//!         .qparam("page", "1")
//!         .send();
//!
//!     assert_eq!(request.wait(), Status::Done);
//!     let response = request.take()?;
//!     println!("{} {}", response.http_code(), response.text().unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! # Model
//!
//! `send()` pushes the frozen request onto a submission queue and returns a
//! cheap cloneable handle. An engine tick ([`perform`]) attaches queued
//! requests to the transport, drives every active transfer one step,
//! classifies completions and idle timeouts, then fires completion
//! callbacks. [`wait_activity`] parks the ticking thread until either a new
//! submission or transport socket activity arrives; [`Performer`] runs that
//! loop for you.
//!
//! Streaming is pluggable per request: an [`Uploader`] feeds the body out,
//! a [`Downloader`] receives the response body, a [`Progressor`] aggregates
//! progress. The defaults stream from and to in-memory buffers.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod metrics;
pub(crate) mod queue;
pub(crate) mod state;

// ── Public modules ──────────────────────────────────────────────────────
pub mod body;
pub mod config;
pub mod driver;
pub mod error;
pub mod handler;
pub mod headers;
pub mod request;
pub mod response;

// ── Re-exports: request surface ─────────────────────────────────────────

/// Request body buffer.
pub use body::Content;
/// Client certificate format tag.
pub use config::CertFormat;
/// Client certificate presented during the TLS handshake.
pub use config::ClientCert;
/// Forward proxy descriptor.
pub use config::Proxy;
/// Completion callback type.
pub use request::Callback;
/// HTTP method selector.
pub use request::Method;
/// Handle to a submitted request.
pub use request::Request;
/// Fluent request configuration.
pub use request::RequestBuilder;
/// Request lifecycle status.
pub use request::Status;
/// A completed HTTP exchange.
pub use response::Response;

// ── Re-exports: streaming ───────────────────────────────────────────────

/// Response body sink capability.
pub use handler::Downloader;
/// Progress aggregation capability.
pub use handler::Progressor;
/// Request body source capability.
pub use handler::Uploader;
/// Ordered, case-insensitive header map.
pub use headers::Headers;

// ── Re-exports: engine ──────────────────────────────────────────────────

/// Cancel every queued and active request.
pub use driver::cancel_all_pending_requests;
/// Snapshot handles for every queued and active request.
pub use driver::get_all_pending_requests;
/// Run one engine tick.
pub use driver::perform;
/// Block until the engine plausibly has work.
pub use driver::wait_activity;
/// Tick the engine from a background thread.
pub use driver::Performer;
/// Crate error type.
pub use error::Error;
