//! Shared fixtures for unit tests.

use crate::client::{ReplayResponse, Transport, TransportError};
use crate::outcome::ArchiveReport;
use crate::request::ReplayableRequest;
use async_trait::async_trait;
use http::StatusCode;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::subscriber::DefaultGuard;
use warcreplay_archive::{Archive, ArchiveReader};

/// Serialize one WARC record
pub fn warc_record(kind: &str, target: Option<&str>, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.1\r\n");
    out.extend_from_slice(format!("WARC-Type: {}\r\n", kind).as_bytes());
    if let Some(target) = target {
        out.extend_from_slice(format!("WARC-Target-URI: {}\r\n", target).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", content.len()).as_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// A `request` record for a body-less GET of `url`
pub fn get_record(url: &str) -> Vec<u8> {
    let path = url
        .splitn(4, '/')
        .nth(3)
        .map_or_else(|| "/".to_string(), |rest| format!("/{}", rest));
    let http = format!(
        "GET {} HTTP/1.1\r\nHost: example.test\r\nAccept: */*\r\n\r\n",
        path
    );
    warc_record("request", Some(url), http.as_bytes())
}

/// A `request` record for a POST of `body` to `url`
pub fn post_record(url: &str, body: &str) -> Vec<u8> {
    let http = format!(
        "POST /b HTTP/1.1\r\nHost: example.test\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    warc_record("request", Some(url), http.as_bytes())
}

/// A record that is not a request
pub fn response_record(url: &str) -> Vec<u8> {
    warc_record(
        "response",
        Some(url),
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    )
}

/// Build an in-memory archive from serialized records
pub fn archive(name: &str, records: &[Vec<u8>]) -> Archive<ArchiveReader> {
    let bytes: Vec<u8> = records.concat();
    Archive::from_reader(name, std::io::Cursor::new(bytes)).unwrap()
}

/// Resolved targets of a report, in dispatch order
pub fn dispatched_urls(report: &ArchiveReport) -> Vec<String> {
    let mut outcomes: Vec<_> = report.outcomes.iter().collect();
    outcomes.sort_by_key(|outcome| outcome.sequence);
    outcomes.iter().map(|outcome| outcome.url.to_string()).collect()
}

/// Byte source that sleeps on every read, handing out at most 4 KiB at a time
pub struct SlowRead {
    inner: io::Cursor<Vec<u8>>,
    pause: Duration,
}

impl SlowRead {
    pub fn new(bytes: Vec<u8>, pause: Duration) -> Self {
        Self {
            inner: io::Cursor::new(bytes),
            pause,
        }
    }
}

impl Read for SlowRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(self.pause);
        let len = buf.len().min(4096);
        self.inner.read(&mut buf[..len])
    }
}

/// Formatted log output of the current thread, at info and above
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Start capturing; output stops being captured when the guard drops
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|line| line.contains(needle)).count()
    }

    /// Number of lines logged at `level`, e.g. `"WARN"`
    pub fn count_at(&self, level: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.trim_start().starts_with(level))
            .count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transport that answers 200 after a delay and records what it saw
#[derive(Debug, Default)]
pub struct RecordingTransport {
    delay: Duration,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    seen: Mutex<Vec<String>>,
    finished: Mutex<Vec<Instant>>,
}

impl RecordingTransport {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Most requests ever executing at once
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Targets in the order execution started
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// When each request finished, in completion order
    pub fn finished(&self) -> Vec<Instant> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: ReplayableRequest) -> Result<ReplayResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.url.to_string());

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(Instant::now());
        if request.url.path() == "/fail" {
            return Err(TransportError::Request("connection refused".to_string()));
        }
        Ok(ReplayResponse {
            status: StatusCode::OK,
            bytes: request.body.len() as u64,
        })
    }
}
