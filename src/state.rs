//! The per-request shared state and the bridge that forwards the
//! transport's callbacks into it.
//!
//! One `RequestState` exists per submitted request, shared between the
//! caller's handles, the submission queue, and the engine's active
//! registry. Every mutable field lives behind one mutex; a single condvar
//! is signalled on status changes and on callback completion.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use curl::easy::{Easy2, Handler, List, ReadError, SeekResult, WriteError};

use crate::error::Error;
use crate::handler::{BufferDownloader, ContentUploader, Downloader, Progressor, RatioProgressor, Uploader};
use crate::headers::Headers;
use crate::metrics;
use crate::request::{compose_url, Callback, Method, Request, RequestBuilder, Status};
use crate::response::Response;

/// Timeouts configured at or below zero are raised to this.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Transport receive buffer size, per transfer.
const BUFFER_SIZE: usize = 65536;

pub(crate) struct RequestState {
    inner: Mutex<StateInner>,
    signal: Condvar,
}

struct StateInner {
    config: RequestBuilder,
    uploader: Option<Box<dyn Uploader>>,
    downloader: Option<Box<dyn Downloader>>,
    progressor: Option<Box<dyn Progressor>>,
    callback: Option<Callback>,

    status: Status,
    error: String,
    response: Option<Response>,
    response_headers: Headers,
    response_body: Arc<Mutex<Vec<u8>>>,
    uploaded: u64,
    downloaded: u64,
    progress: f32,
    last_activity: Instant,
    response_timeout: Duration,
    callback_invoked: bool,
    callback_panic: Option<String>,
}

impl RequestState {
    /// Freeze a builder into a shareable state, installing default stream
    /// adapters for any the caller did not supply.
    pub(crate) fn create(mut builder: RequestBuilder) -> Arc<Self> {
        let response_body = Arc::new(Mutex::new(Vec::new()));
        let uploader = builder
            .uploader
            .take()
            .unwrap_or_else(|| Box::new(ContentUploader::new(builder.content.clone().into_bytes())));
        let downloader = builder
            .downloader
            .take()
            .unwrap_or_else(|| Box::new(BufferDownloader::new(response_body.clone())));
        let progressor = builder
            .progressor
            .take()
            .unwrap_or_else(|| Box::new(RatioProgressor));
        let callback = builder.callback.take();
        let response_timeout = builder.response_timeout.max(MIN_TIMEOUT);

        Arc::new(RequestState {
            inner: Mutex::new(StateInner {
                config: builder,
                uploader: Some(uploader),
                downloader: Some(downloader),
                progressor: Some(progressor),
                callback,
                status: Status::Pending,
                error: String::from("Unknown error"),
                response: None,
                response_headers: Headers::new(),
                response_body,
                uploaded: 0,
                downloaded: 0,
                progress: 0.0,
                last_activity: Instant::now(),
                response_timeout,
                callback_invoked: false,
                callback_panic: None,
            }),
            signal: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Attach-time configuration ────────────────────────────────────

    /// Apply the frozen configuration to a fresh easy handle. Called by the
    /// engine right before the handle joins the multi.
    pub(crate) fn configure(&self, easy: &mut Easy2<Bridge>) -> Result<(), Error> {
        let mut inner = self.lock();

        easy.useragent(&format!("cURL/{}", curl::Version::get().version()))?;
        easy.signal(false)?;
        easy.tcp_keepalive(true)?;
        easy.buffer_size(BUFFER_SIZE)?;
        easy.progress(true)?;

        let url = compose_url(&inner.config.url, &inner.config.qparams);
        easy.url(&url)?;
        easy.http_headers(header_list(&inner.config.headers)?)?;
        easy.verbose(inner.config.verbose)?;

        let upload_size = inner.uploader.as_ref().map_or(0, |u| u.size());
        match inner.config.method {
            Method::Get => easy.get(true)?,
            Method::Head => easy.nobody(true)?,
            Method::Post => {
                easy.post(true)?;
                easy.post_field_size(upload_size)?;
            }
            Method::Put => {
                easy.upload(true)?;
                easy.in_filesize(upload_size)?;
            }
            Method::Patch => {
                easy.custom_request("PATCH")?;
                easy.upload(true)?;
                easy.in_filesize(upload_size)?;
            }
            Method::Delete => {
                easy.custom_request("DELETE")?;
                easy.post(true)?;
                easy.post_field_size(upload_size)?;
            }
            Method::Options => {
                easy.custom_request("OPTIONS")?;
                easy.nobody(true)?;
            }
        }

        easy.ssl_verify_peer(inner.config.verification)?;
        easy.ssl_verify_host(inner.config.verification)?;
        if let Some(path) = &inner.config.capath {
            easy.capath(path)?;
        }
        if let Some(path) = &inner.config.cabundle {
            easy.cainfo(path)?;
        }

        if inner.config.redirections > 0 {
            easy.follow_location(true)?;
            easy.max_redirections(inner.config.redirections)?;
        } else {
            easy.follow_location(false)?;
        }

        easy.timeout(inner.config.request_timeout.max(MIN_TIMEOUT))?;
        easy.connect_timeout(inner.config.connection_timeout.max(MIN_TIMEOUT))?;

        if let Some(proxy) = &inner.config.proxy {
            easy.proxy(proxy.url())?;
            if let Some(username) = proxy.username() {
                easy.proxy_username(username)?;
            }
            if let Some(password) = proxy.password() {
                easy.proxy_password(password)?;
            }
        }

        if let Some(cert) = &inner.config.client_cert {
            easy.ssl_cert(cert.path())?;
            easy.ssl_cert_type(cert.format().as_str())?;
            if let Some(password) = cert.key_password() {
                easy.key_password(password)?;
            }
        }

        if let Some(key) = &inner.config.pinned_public_key {
            easy.pinned_public_key(key)?;
        }
        if inner.config.resume_offset > 0 {
            easy.resume_from(inner.config.resume_offset)?;
        }

        inner.last_activity = Instant::now();
        Ok(())
    }

    // ── Terminal transitions ─────────────────────────────────────────

    /// Seal a successful transfer: build the response from the accumulated
    /// headers and body and surrender the adapters into it.
    pub(crate) fn complete(&self, url: &str, code: u16) -> bool {
        let mut inner = self.lock();
        if inner.status != Status::Pending {
            self.signal.notify_all();
            return false;
        }

        let headers = std::mem::take(&mut inner.response_headers);
        let body = {
            let mut buf = inner.response_body.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *buf)
        };
        inner.response = Some(Response::new(
            url.to_string(),
            code,
            headers,
            Bytes::from(body),
            inner.uploader.take(),
            inner.downloader.take(),
            inner.progressor.take(),
        ));

        inner.progress = 1.0;
        inner.status = Status::Done;
        inner.error.clear();
        metrics::REQUESTS_COMPLETED.increment();

        self.signal.notify_all();
        true
    }

    /// Classify a transport error into a terminal status.
    pub(crate) fn fail(&self, err: &curl::Error) -> bool {
        let (status, message) = if err.is_operation_timedout() {
            (Status::Timeout, String::from("Operation timeout"))
        } else if err.is_read_error() || err.is_write_error() || err.is_aborted_by_callback() {
            (Status::Cancelled, String::from("Callback aborted"))
        } else {
            let message = err
                .extra_description()
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            (Status::Failed, message)
        };
        self.finish(status, message)
    }

    /// Engine-forced response-idle timeout.
    pub(crate) fn fail_timeout(&self) -> bool {
        self.finish(Status::Timeout, String::from("Operation timeout"))
    }

    /// Setup failure before the transfer reached the transport.
    pub(crate) fn fail_message(&self, message: String) -> bool {
        self.finish(Status::Failed, message)
    }

    /// Cancel if still pending; returns whether this call transitioned.
    pub(crate) fn cancel(&self) -> bool {
        self.finish(Status::Cancelled, String::from("Operation cancelled"))
    }

    fn finish(&self, status: Status, message: String) -> bool {
        let mut inner = self.lock();
        if inner.status != Status::Pending {
            self.signal.notify_all();
            return false;
        }
        inner.status = status;
        inner.error = message;
        match status {
            Status::Timeout => metrics::REQUESTS_TIMEOUT.increment(),
            Status::Cancelled => metrics::REQUESTS_CANCELLED.increment(),
            _ => metrics::REQUESTS_FAILED.increment(),
        };
        self.signal.notify_all();
        true
    }

    // ── Engine-side queries ──────────────────────────────────────────

    /// Whether the transport has been quiet longer than the response-idle
    /// timeout.
    pub(crate) fn idle_expired(&self, now: Instant) -> bool {
        let inner = self.lock();
        now.saturating_duration_since(inner.last_activity) >= inner.response_timeout
    }

    /// Deliver the completion callback. The engine calls this exactly once
    /// per request, after the status left `Pending`. A panic inside the
    /// callback is captured; it never reaches the engine.
    pub(crate) fn run_callback(self: &Arc<Self>) {
        let callback = {
            let mut inner = self.lock();
            debug_assert!(inner.status != Status::Pending && !inner.callback_invoked);
            inner.callback.take()
        };
        let panic_message = callback.and_then(|callback| {
            panic::catch_unwind(AssertUnwindSafe(|| callback(Request::new(self.clone()))))
                .err()
                .map(panic_text)
        });
        let mut inner = self.lock();
        inner.callback_panic = panic_message;
        inner.callback_invoked = true;
        self.signal.notify_all();
    }

    // ── Handle-side queries ──────────────────────────────────────────

    pub(crate) fn status(&self) -> Status {
        self.lock().status
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub(crate) fn progress(&self) -> f32 {
        self.lock().progress
    }

    pub(crate) fn wait(&self, wait_callback: bool) -> Status {
        let mut inner = self.lock();
        while inner.status == Status::Pending || (wait_callback && !inner.callback_invoked) {
            inner = self.signal.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        inner.status
    }

    pub(crate) fn wait_for(&self, timeout: Duration, wait_callback: bool) -> Status {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline, wait_callback),
            None => self.wait(wait_callback),
        }
    }

    pub(crate) fn wait_until(&self, deadline: Instant, wait_callback: bool) -> Status {
        let mut inner = self.lock();
        loop {
            if inner.status != Status::Pending && (!wait_callback || inner.callback_invoked) {
                return inner.status;
            }
            let now = Instant::now();
            if now >= deadline {
                return inner.status;
            }
            let (guard, _) = self
                .signal
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    pub(crate) fn take(&self) -> Result<Response, Error> {
        let mut inner = self.lock();
        while inner.status == Status::Pending {
            inner = self.signal.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        if inner.status != Status::Done {
            return Err(Error::ResponseUnavailable(inner.status));
        }
        inner.status = Status::Empty;
        let response = inner.response.take();
        self.signal.notify_all();
        response.ok_or(Error::ResponseUnavailable(Status::Empty))
    }

    pub(crate) fn error(&self) -> String {
        let mut inner = self.lock();
        while inner.status == Status::Pending {
            inner = self.signal.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        inner.error.clone()
    }

    pub(crate) fn callback_panic(&self) -> Option<String> {
        let mut inner = self.lock();
        while !inner.callback_invoked {
            inner = self.signal.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        inner.callback_panic.clone()
    }

    // ── Transport callbacks ──────────────────────────────────────────

    fn on_read(&self, dst: &mut [u8]) -> Result<usize, ReadError> {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        let inner = &mut *inner;
        let Some(uploader) = inner.uploader.as_mut() else {
            return Err(ReadError::Abort);
        };
        let remaining = uploader.size().saturating_sub(inner.uploaded);
        let limit = (dst.len() as u64).min(remaining) as usize;
        match panic::catch_unwind(AssertUnwindSafe(|| uploader.read(&mut dst[..limit]))) {
            Ok(Ok(n)) => {
                inner.uploaded += n as u64;
                metrics::BYTES_UPLOADED.add(n as u64);
                Ok(n)
            }
            _ => Err(ReadError::Abort),
        }
    }

    /// Returns bytes consumed; anything short of `src.len()` makes the
    /// transport treat the transfer as write-failed.
    fn on_write(&self, src: &[u8]) -> usize {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        let inner = &mut *inner;
        let Some(downloader) = inner.downloader.as_mut() else {
            return 0;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| downloader.write(src))) {
            Ok(Ok(n)) => {
                inner.downloaded += n as u64;
                metrics::BYTES_DOWNLOADED.add(n as u64);
                n
            }
            _ => 0,
        }
    }

    fn on_header(&self, line: &[u8]) -> bool {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        let line = String::from_utf8_lossy(line);
        if line.starts_with("HTTP/") {
            // A new status line: whatever was accumulated belongs to an
            // intermediate (redirect) response.
            inner.response_headers.clear();
        } else if let Some((name, value)) = parse_header_line(&line) {
            inner.response_headers.insert(name, value);
        }
        true
    }

    /// Deliberately does not touch `last_activity`: the transport invokes
    /// this on every tick even when no bytes move, which would make the
    /// response-idle timeout unreachable for a stalled server.
    fn on_progress(&self, dltotal: f64, dlnow: f64, ultotal: f64, ulnow: f64) -> bool {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let Some(progressor) = inner.progressor.as_mut() else {
            return true;
        };
        let count = |v: f64| if v > 0.0 { v as u64 } else { 0 };
        let update = panic::catch_unwind(AssertUnwindSafe(|| {
            progressor.update(count(dlnow), count(dltotal), count(ulnow), count(ultotal))
        }));
        match update {
            Ok(fraction) => {
                inner.progress = fraction.clamp(0.0, 1.0);
                true
            }
            Err(_) => false,
        }
    }

    fn on_seek(&self, whence: io::SeekFrom) -> SeekResult {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let io::SeekFrom::Start(offset) = whence else {
            return SeekResult::CantSeek;
        };
        let Some(uploader) = inner.uploader.as_mut() else {
            return SeekResult::Fail;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| uploader.rewind(offset))) {
            Ok(true) => {
                inner.uploaded = offset;
                SeekResult::Ok
            }
            Ok(false) => SeekResult::CantSeek,
            Err(_) => SeekResult::Fail,
        }
    }
}

/// Forwards the transport's per-transfer callbacks into the shared state.
/// Installed as the easy handle's handler at attach time and dropped with
/// it at detach.
pub(crate) struct Bridge {
    state: Arc<RequestState>,
}

impl Bridge {
    pub(crate) fn new(state: Arc<RequestState>) -> Self {
        Bridge { state }
    }
}

impl Handler for Bridge {
    fn read(&mut self, data: &mut [u8]) -> Result<usize, ReadError> {
        self.state.on_read(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        Ok(self.state.on_write(data))
    }

    fn header(&mut self, data: &[u8]) -> bool {
        self.state.on_header(data)
    }

    fn progress(&mut self, dltotal: f64, dlnow: f64, ultotal: f64, ulnow: f64) -> bool {
        self.state.on_progress(dltotal, dlnow, ultotal, ulnow)
    }

    fn seek(&mut self, whence: io::SeekFrom) -> SeekResult {
        self.state.on_seek(whence)
    }
}

/// Materialise the configured headers as a transport header list:
/// `"name: value"`, or `"name;"` so an empty value survives the transport.
fn header_list(headers: &Headers) -> Result<List, Error> {
    let mut list = List::new();
    for (name, value) in headers.iter() {
        if name.is_empty() {
            continue;
        }
        let line = if value.is_empty() {
            format!("{name};")
        } else {
            format!("{name}: {value}")
        };
        list.append(&line)?;
    }
    Ok(list)
}

/// Split one raw header line into a `(name, value)` pair, trimming the
/// value of leading tabs/spaces and trailing CR/LF/tabs/spaces. Lines
/// without a colon or with an empty name yield `None`.
fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    let value = value
        .trim_start_matches(&['\t', ' '][..])
        .trim_end_matches(&['\r', '\n', '\t', ' '][..]);
    Some((name, value))
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("opaque panic payload")
    }
}
