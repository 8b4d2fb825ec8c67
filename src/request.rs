//! The public request surface: method and status enums, the fluent builder,
//! and the handle returned by `send`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::body::Content;
use crate::config::{ClientCert, Proxy};
use crate::error::Error;
use crate::handler::{Downloader, Progressor, Uploader};
use crate::headers::Headers;
use crate::metrics;
use crate::queue::SUBMIT;
use crate::response::Response;
use crate::state::RequestState;

/// HTTP method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// The method's wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

/// Lifecycle status of a submitted request.
///
/// `Pending` moves to exactly one of `Done`, `Failed`, `Timeout` or
/// `Cancelled`; taking the response moves `Done` to `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Queued or in flight.
    Pending,
    /// Finished with an HTTP response, not yet taken.
    Done,
    /// The response has been taken.
    Empty,
    /// Transport or setup error.
    Failed,
    /// A configured timeout expired.
    Timeout,
    /// Cancelled explicitly or aborted by a stream adapter.
    Cancelled,
}

/// Completion callback, invoked exactly once on the engine thread after the
/// request reaches a terminal status.
pub type Callback = Box<dyn FnOnce(Request) + Send + 'static>;

/// Handle to a submitted request.
///
/// Clones refer to the same underlying request; equality is identity.
#[derive(Clone)]
pub struct Request {
    state: Arc<RequestState>,
}

impl Request {
    pub(crate) fn new(state: Arc<RequestState>) -> Self {
        Request { state }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Whether the request finished with a response still available.
    pub fn is_done(&self) -> bool {
        self.status() == Status::Done
    }

    /// Whether the request is still queued or in flight.
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// Last progress fraction reported by the progressor, in `[0, 1]`.
    /// Always 1 once the request is done.
    pub fn progress(&self) -> f32 {
        self.state.progress()
    }

    /// Cancel the request if it is still pending. Returns whether this call
    /// performed the transition. Non-blocking; an in-flight transfer is
    /// detached from the transport on the next engine tick.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Block until the request reaches a terminal status and return it.
    pub fn wait(&self) -> Status {
        self.state.wait(false)
    }

    /// Like [`wait`](Self::wait) with a relative deadline; returns the
    /// current status at expiry.
    pub fn wait_for(&self, timeout: Duration) -> Status {
        self.state.wait_for(timeout, false)
    }

    /// Like [`wait`](Self::wait) with an absolute deadline.
    pub fn wait_until(&self, deadline: Instant) -> Status {
        self.state.wait_until(deadline, false)
    }

    /// Block until the terminal status is set *and* the completion callback
    /// has finished.
    pub fn wait_callback(&self) -> Status {
        self.state.wait(true)
    }

    /// [`wait_callback`](Self::wait_callback) with a relative deadline.
    pub fn wait_callback_for(&self, timeout: Duration) -> Status {
        self.state.wait_for(timeout, true)
    }

    /// [`wait_callback`](Self::wait_callback) with an absolute deadline.
    pub fn wait_callback_until(&self, deadline: Instant) -> Status {
        self.state.wait_until(deadline, true)
    }

    /// Block until terminal, then move the response out. Succeeds exactly
    /// once, and only for a request that finished `Done`.
    pub fn take(&self) -> Result<Response, Error> {
        self.state.take()
    }

    /// Block until terminal, then return the error message ("Operation
    /// timeout", "Operation cancelled", the transport's text, ...). Empty
    /// for a request that finished `Done`.
    pub fn error(&self) -> String {
        self.state.error()
    }

    /// Block until the completion callback has run, then return the panic
    /// message it raised, if any.
    pub fn callback_panic(&self) -> Option<String> {
        self.state.callback_panic()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for Request {}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("status", &self.status())
            .finish()
    }
}

/// Fluent request configuration. `send` freezes it and hands it to the
/// engine; nothing can be changed afterwards.
pub struct RequestBuilder {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) headers: Headers,
    pub(crate) qparams: Vec<(String, String)>,
    pub(crate) content: Content,
    pub(crate) request_timeout: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) connection_timeout: Duration,
    pub(crate) redirections: u32,
    pub(crate) verification: bool,
    pub(crate) capath: Option<PathBuf>,
    pub(crate) cabundle: Option<PathBuf>,
    pub(crate) proxy: Option<Proxy>,
    pub(crate) client_cert: Option<ClientCert>,
    pub(crate) pinned_public_key: Option<String>,
    pub(crate) resume_offset: u64,
    pub(crate) verbose: bool,
    pub(crate) uploader: Option<Box<dyn Uploader>>,
    pub(crate) downloader: Option<Box<dyn Downloader>>,
    pub(crate) progressor: Option<Box<dyn Progressor>>,
    pub(crate) callback: Option<Callback>,
}

impl RequestBuilder {
    /// A GET request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_method(Method::Get, url)
    }

    /// A request for `url` with an explicit method.
    pub fn with_method(method: Method, url: impl Into<String>) -> Self {
        RequestBuilder {
            url: url.into(),
            method,
            headers: Headers::new(),
            qparams: Vec::new(),
            content: Content::default(),
            request_timeout: Duration::from_secs(u32::MAX as u64),
            response_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(20),
            redirections: 10,
            verification: false,
            capath: None,
            cabundle: None,
            proxy: None,
            client_cert: None,
            pinned_public_key: None,
            resume_offset: 0,
            verbose: false,
            uploader: None,
            downloader: None,
            progressor: None,
            callback: None,
        }
    }

    // ── Target ───────────────────────────────────────────────────────

    /// Replace the URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append one query parameter. Parameters keep their insertion order;
    /// duplicate keys are allowed. An empty value is emitted without `=`;
    /// a pair with an empty key is dropped at composition.
    pub fn qparam(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qparams.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters.
    pub fn qparams<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.qparams
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    // ── Headers and body ─────────────────────────────────────────────

    /// Set one request header; a later write to the same name (in any
    /// casing) wins.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    /// Set several request headers.
    pub fn headers<N, V>(mut self, headers: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value);
        }
        self
    }

    /// Set the request body.
    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = content.into();
        self
    }

    /// Set an `application/x-www-form-urlencoded` body from key/value
    /// pairs; empty keys are skipped.
    pub fn form(self, pairs: &[(&str, &str)]) -> Self {
        let mut easy = curl::easy::Easy::new();
        let mut body = String::new();
        for (key, value) in pairs {
            if key.is_empty() {
                continue;
            }
            if !body.is_empty() {
                body.push('&');
            }
            body.push_str(&easy.url_encode(key.as_bytes()));
            body.push('=');
            body.push_str(&easy.url_encode(value.as_bytes()));
        }
        self.content(body)
    }

    // ── Timeouts and redirects ───────────────────────────────────────

    /// Total wall-clock budget for the whole transfer.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Maximum quiet interval: if the transport reports no read, write or
    /// header activity for this long, the request fails with `Timeout`.
    /// Values below 1 ms are raised to 1 ms.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Connection establishment budget.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Maximum number of redirects to follow; 0 disables following and the
    /// first 3xx response is returned verbatim.
    pub fn redirections(mut self, limit: u32) -> Self {
        self.redirections = limit;
        self
    }

    // ── TLS, proxy, resume ───────────────────────────────────────────

    /// Enable or disable TLS peer/host verification.
    pub fn verification(mut self, verify: bool) -> Self {
        self.verification = verify;
        self
    }

    /// Directory holding CA certificates for verification.
    pub fn ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.capath = Some(path.into());
        self
    }

    /// CA bundle file for verification.
    pub fn ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.cabundle = Some(path.into());
        self
    }

    /// Route the request through a proxy.
    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Present a client certificate during the TLS handshake.
    pub fn client_cert(mut self, cert: ClientCert) -> Self {
        self.client_cert = Some(cert);
        self
    }

    /// Pin the server's public key (`sha256//...` or a key file path).
    pub fn pinned_public_key(mut self, key: impl Into<String>) -> Self {
        self.pinned_public_key = Some(key.into());
        self
    }

    /// Resume the download from a byte offset.
    pub fn resume_offset(mut self, offset: u64) -> Self {
        self.resume_offset = offset;
        self
    }

    /// Enable the transport's verbose tracing for this request.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    // ── Streaming and completion ─────────────────────────────────────

    /// Supply the request body from a custom source instead of the body
    /// buffer.
    pub fn uploader(mut self, uploader: impl Uploader + 'static) -> Self {
        self.uploader = Some(Box::new(uploader));
        self
    }

    /// Stream the response body into a custom sink instead of the
    /// in-memory buffer.
    pub fn downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloader = Some(Box::new(downloader));
        self
    }

    /// Replace the progress aggregation.
    pub fn progressor(mut self, progressor: impl Progressor + 'static) -> Self {
        self.progressor = Some(Box::new(progressor));
        self
    }

    /// Completion callback, invoked exactly once on the engine thread once
    /// the request reaches a terminal status. A panic inside it is captured
    /// on the request, never propagated into the engine.
    pub fn callback(mut self, callback: impl FnOnce(Request) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    // ── Terminal ─────────────────────────────────────────────────────

    /// Freeze the configuration, enqueue it for the engine, and return the
    /// handle. The request stays `Pending` until a tick attaches and the
    /// transport finishes it.
    pub fn send(self) -> Request {
        let state = RequestState::create(self);
        metrics::REQUESTS_SUBMITTED.increment();
        SUBMIT.push(state.clone());
        Request::new(state)
    }
}

/// Append escaped query parameters to `url`, honouring a pre-existing `?`.
///
/// Pairs with an empty key are skipped; empty values are emitted
/// without `=`.
pub(crate) fn compose_url(url: &str, qparams: &[(String, String)]) -> String {
    let mut easy = curl::easy::Easy::new();
    let mut out = String::from(url);
    let mut has_query = url.contains('?');
    for (key, value) in qparams {
        if key.is_empty() {
            continue;
        }
        out.push(if has_query { '&' } else { '?' });
        out.push_str(&easy.url_encode(key.as_bytes()));
        if !value.is_empty() {
            out.push('=');
            out.push_str(&easy.url_encode(value.as_bytes()));
        }
        has_query = true;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn compose_url_appends_with_question_mark_then_ampersand() {
        let params = pairs(&[("a", "1"), ("b", "2")]);
        assert_eq!(
            compose_url("http://host/path", &params),
            "http://host/path?a=1&b=2"
        );
    }

    #[test]
    fn compose_url_extends_existing_query() {
        let params = pairs(&[("a", "1")]);
        assert_eq!(
            compose_url("http://host/path?x=0", &params),
            "http://host/path?x=0&a=1"
        );
    }

    #[test]
    fn compose_url_escapes_keys_and_values() {
        let params = pairs(&[("sp ace", "v&al")]);
        assert_eq!(
            compose_url("http://host/", &params),
            "http://host/?sp%20ace=v%26al"
        );
    }

    #[test]
    fn compose_url_handles_empty_keys_and_values() {
        // Empty values are emitted bare; empty keys are dropped entirely.
        let params = pairs(&[("flag", ""), ("", "orphan"), ("", ""), ("k", "v")]);
        assert_eq!(compose_url("http://host/", &params), "http://host/?flag&k=v");
    }

    #[test]
    fn builder_defaults() {
        let builder = RequestBuilder::new("http://host/");
        assert_eq!(builder.method, Method::Get);
        assert_eq!(builder.redirections, 10);
        assert_eq!(builder.response_timeout, Duration::from_secs(60));
        assert_eq!(builder.connection_timeout, Duration::from_secs(20));
        assert!(!builder.verification);
        assert!(builder.qparams.is_empty());
    }

    #[test]
    fn form_builds_urlencoded_body() {
        let builder = RequestBuilder::new("http://host/").form(&[("a b", "1"), ("", "x"), ("c", "&")]);
        assert_eq!(builder.content.as_str(), Some("a%20b=1&c=%26"));
    }

    #[test]
    fn method_wire_names() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(Method::Options.as_str(), "OPTIONS");
    }
}
