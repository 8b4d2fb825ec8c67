//! Streaming capabilities: request body source, response body sink, and
//! progress aggregation.
//!
//! All three run on the engine thread, invoked by the transport while a
//! transfer makes progress. An `Err` return (or a panic) aborts the
//! transfer and the request finishes `Cancelled`.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

/// Supplies the request body to the transport.
///
/// `read` may be called many times per request, in windows the transport
/// chooses; implementations must tolerate at-least-once delivery per byte
/// window.
pub trait Uploader: Send {
    /// Total number of bytes this uploader will provide. Reported to the
    /// server as the request content length.
    fn size(&self) -> u64;

    /// Copy up to `dst.len()` bytes into `dst` and return how many were
    /// written.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;

    /// Reposition to an absolute byte offset so the body can be re-sent
    /// (redirects, retries). Return `false` if unsupported.
    fn rewind(&mut self, offset: u64) -> bool {
        let _ = offset;
        false
    }
}

/// Receives response body bytes from the transport.
pub trait Downloader: Send {
    /// Consume `src` and return how many bytes were accepted. Accepting
    /// fewer than `src.len()` bytes aborts the transfer.
    fn write(&mut self, src: &[u8]) -> io::Result<usize>;
}

/// Aggregates transfer counters into a single progress fraction.
pub trait Progressor: Send {
    /// Byte counts are (downloaded, download total, uploaded, upload
    /// total); totals may be 0 while unknown. The engine clamps the result
    /// to `[0, 1]`.
    fn update(&mut self, dlnow: u64, dltotal: u64, ulnow: u64, ultotal: u64) -> f32;
}

/// Default uploader: a cursor over the request's body buffer.
pub(crate) struct ContentUploader {
    data: Bytes,
    cursor: usize,
}

impl ContentUploader {
    pub(crate) fn new(data: Bytes) -> Self {
        ContentUploader { data, cursor: 0 }
    }
}

impl Uploader for ContentUploader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() - self.cursor;
        let n = dst.len().min(remaining);
        dst[..n].copy_from_slice(&self.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn rewind(&mut self, offset: u64) -> bool {
        if offset <= self.data.len() as u64 {
            self.cursor = offset as usize;
            true
        } else {
            false
        }
    }
}

/// Default downloader: appends into the response buffer shared with the
/// request state.
pub(crate) struct BufferDownloader {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferDownloader {
    pub(crate) fn new(buf: Arc<Mutex<Vec<u8>>>) -> Self {
        BufferDownloader { buf }
    }
}

impl Downloader for BufferDownloader {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend_from_slice(src);
        Ok(src.len())
    }
}

/// Default progressor: bytes transferred over bytes expected.
pub(crate) struct RatioProgressor;

impl Progressor for RatioProgressor {
    fn update(&mut self, dlnow: u64, dltotal: u64, ulnow: u64, ultotal: u64) -> f32 {
        let total = (dltotal + ultotal) as f64;
        if total <= 0.0 {
            return 0.0;
        }
        let now = (dlnow + ulnow) as f64;
        ((now / total) as f32).clamp(0.0, 1.0)
    }
}
