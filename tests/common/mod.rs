//! Minimal HTTP/1.1 server for exercising the engine against real sockets.
//!
//! Each test starts its own server with a route closure; every connection
//! serves one request and closes. Responses can be delayed or stalled to
//! exercise the timeout paths.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One parsed inbound request.
pub struct TestRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Canned reply produced by a route closure.
pub struct TestResponse {
    code: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
    stall: bool,
    trickle: Option<(usize, Duration)>,
}

impl TestResponse {
    /// 200 with the given body.
    pub fn ok(body: impl AsRef<[u8]>) -> Self {
        Self::with_code(200).body(body)
    }

    /// Empty response with an arbitrary status code.
    pub fn with_code(code: u16) -> Self {
        TestResponse {
            code,
            headers: Vec::new(),
            body: Vec::new(),
            delay: Duration::ZERO,
            stall: false,
            trickle: None,
        }
    }

    /// 302 pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self::with_code(302).header("Location", location)
    }

    /// Accept the request, then never answer.
    pub fn stalled() -> Self {
        let mut response = Self::with_code(200);
        response.stall = true;
        response
    }

    pub fn body(mut self, body: impl AsRef<[u8]>) -> Self {
        self.body = body.as_ref().to_vec();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sleep before writing the response.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write the body in `chunks` pieces with `interval` pauses between
    /// them, to simulate a slow but live stream.
    pub fn trickle(mut self, chunks: usize, interval: Duration) -> Self {
        self.trickle = Some((chunks.max(1), interval));
        self
    }
}

type RouteFn = dyn Fn(&TestRequest) -> TestResponse + Send + Sync;

pub struct TestServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&TestRequest) -> TestResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");
        let stop = Arc::new(AtomicBool::new(false));
        let handler: Arc<RouteFn> = Arc::new(handler);

        let stop_flag = stop.clone();
        let thread = thread::spawn(move || {
            for stream in listener.incoming() {
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                let Ok(stream) = stream else { break };
                let handler = handler.clone();
                thread::spawn(move || serve_one(stream, &*handler));
            }
        });

        TestServer {
            addr,
            stop,
            thread: Some(thread),
        }
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Wake the accept loop so it observes the flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve_one(stream: TcpStream, handler: &RouteFn) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;

    let mut line = String::new();
    if reader.read_line(&mut line).unwrap_or(0) == 0 {
        return;
    }
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return;
    };
    let method = method.to_string();
    let target = target.to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 {
            return;
        }
        let header = header.trim_end_matches(&['\r', '\n'][..]);
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let find = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    if find("expect").is_some_and(|v| v.eq_ignore_ascii_case("100-continue")) {
        let _ = writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n");
        let _ = writer.flush();
    }

    let content_length = find("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        return;
    }

    let request = TestRequest {
        method,
        target,
        headers,
        body,
    };
    let response = handler(&request);

    if response.stall {
        // Hold the connection open without answering; the client's idle
        // timeout is expected to fire first.
        thread::sleep(Duration::from_secs(5));
        return;
    }
    if !response.delay.is_zero() {
        thread::sleep(response.delay);
    }

    let mut out = format!("HTTP/1.1 {} {}\r\n", response.code, reason(response.code));
    for (name, value) in &response.headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    out.push_str("Connection: close\r\n\r\n");
    let _ = writer.write_all(out.as_bytes());
    let _ = writer.flush();
    if request.method == "HEAD" {
        return;
    }
    match response.trickle {
        Some((chunks, interval)) if !response.body.is_empty() => {
            let piece = response.body.len().div_ceil(chunks);
            for chunk in response.body.chunks(piece) {
                let _ = writer.write_all(chunk);
                let _ = writer.flush();
                thread::sleep(interval);
            }
        }
        _ => {
            let _ = writer.write_all(&response.body);
            let _ = writer.flush();
        }
    }
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
