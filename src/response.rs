use std::fmt;

use bytes::Bytes;

use crate::error::Error;
use crate::handler::{Downloader, Progressor, Uploader};
use crate::headers::Headers;

/// A completed HTTP exchange.
///
/// Built once per request and moved out by [`Request::take`]; the three
/// stream adapters the request owned are surrendered back through it.
///
/// [`Request::take`]: crate::Request::take
pub struct Response {
    url: String,
    code: u16,
    headers: Headers,
    body: Bytes,
    uploader: Option<Box<dyn Uploader>>,
    downloader: Option<Box<dyn Downloader>>,
    progressor: Option<Box<dyn Progressor>>,
}

impl Response {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        url: String,
        code: u16,
        headers: Headers,
        body: Bytes,
        uploader: Option<Box<dyn Uploader>>,
        downloader: Option<Box<dyn Downloader>>,
        progressor: Option<Box<dyn Progressor>>,
    ) -> Self {
        Response {
            url,
            code,
            headers,
            body,
            uploader,
            downloader,
            progressor,
        }
    }

    /// Final effective URL, after any redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Numeric HTTP status code.
    pub fn http_code(&self) -> u16 {
        self.code
    }

    /// Whether the server answered with an error code (>= 400). HTTP errors
    /// are still successful transfers at the engine level.
    pub fn is_http_error(&self) -> bool {
        self.code >= 400
    }

    /// Response headers of the final response only.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// One header value, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Declared content length, if the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// The response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response, keeping only the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body).map_err(|_| Error::BodyDecode)
    }

    /// Reclaim the uploader that fed this request.
    pub fn take_uploader(&mut self) -> Option<Box<dyn Uploader>> {
        self.uploader.take()
    }

    /// Reclaim the downloader that received this response.
    pub fn take_downloader(&mut self) -> Option<Box<dyn Downloader>> {
        self.downloader.take()
    }

    /// Reclaim the progressor.
    pub fn take_progressor(&mut self) -> Option<Box<dyn Progressor>> {
        self.progressor.take()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url)
            .field("code", &self.code)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u16, body: &'static [u8]) -> Response {
        let mut headers = Headers::new();
        headers.insert("Content-Length", body.len().to_string());
        Response::new(
            String::from("http://localhost/x"),
            code,
            headers,
            Bytes::from_static(body),
            None,
            None,
            None,
        )
    }

    #[test]
    fn http_error_threshold() {
        assert!(!response(200, b"ok").is_http_error());
        assert!(!response(399, b"").is_http_error());
        assert!(response(400, b"").is_http_error());
        assert!(response(500, b"").is_http_error());
    }

    #[test]
    fn text_decodes_utf8() {
        assert_eq!(response(200, b"hello").text().unwrap(), "hello");
        assert!(matches!(
            response(200, &[0xff, 0xfe]).text(),
            Err(Error::BodyDecode)
        ));
    }

    #[test]
    fn content_length_comes_from_headers() {
        assert_eq!(response(200, b"12345").content_length(), Some(5));
    }
}
