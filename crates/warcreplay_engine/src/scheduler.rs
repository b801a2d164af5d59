//! Bounded replay of one archive.
//!
//! A blocking reader thread reads records strictly in order and turns request
//! records into owned requests. It hands them one at a time to the scheduler,
//! which waits for a free in-flight slot and gives each request its own task.
//! Reading never runs on an async worker, so in-flight requests keep making
//! progress while large non-request records are skipped.

use crate::client::Transport;
use crate::error::ReplayError;
use crate::limiter::{ConcurrencyLimiter, InFlightPermit};
use crate::materialize::materialize;
use crate::outcome::{ArchiveReport, OutcomeStatus, ReplayOutcome};
use crate::request::ReplayableRequest;
use http::Method;
use reqwest::Url;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use warcreplay_archive::{Archive, RecordSource};

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Reading records and dispatching requests
    Running,
    /// Archive exhausted or aborted, waiting for in-flight requests
    Draining,
    /// Nothing left in flight
    Done,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Replays one archive with at most `cap` requests in flight
pub struct ArchiveScheduler<T> {
    transport: Arc<T>,
    limiter: ConcurrencyLimiter,
    state: SchedulerState,
}

impl<T> fmt::Debug for ArchiveScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveScheduler")
            .field("limiter", &self.limiter)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// What is known about a dispatched request while its task runs
struct InFlight {
    sequence: u64,
    method: Method,
    url: Url,
}

impl<T: Transport> ArchiveScheduler<T> {
    /// Create a scheduler sharing `transport` with every other scheduler
    #[must_use]
    pub fn new(transport: Arc<T>, cap: usize) -> Self {
        Self {
            transport,
            limiter: ConcurrencyLimiter::new(cap),
            state: SchedulerState::Running,
        }
    }

    /// Replay every request record of `archive`.
    ///
    /// The archive is consumed and read on a blocking thread; its stream is
    /// closed as soon as reading stops. A fatal archive error stops reading
    /// but requests already in flight still run to completion and are
    /// reported.
    pub async fn run<S>(mut self, archive: Archive<S>) -> ArchiveReport
    where
        S: RecordSource + Send + 'static,
    {
        let (name, source) = archive.into_parts();
        let name: Arc<str> = Arc::from(name);
        let mut report = ArchiveReport::new(name.clone());
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();

        tracing::debug!(archive = %name, cap = self.limiter.cap(), "replaying archive");

        let (requests, mut incoming) = mpsc::channel(1);
        let span = tracing::Span::current();
        let reader = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            read_requests(source, &requests)
        });

        while let Some(next) = incoming.recv().await {
            let request = match next {
                Ok(request) => request,
                Err(err) => {
                    report.error = Some(err);
                    break;
                }
            };

            let permit = match self.limiter.acquire().await {
                Ok(permit) => permit,
                Err(err) => {
                    report.error = Some(ReplayError::Scheduler(err.to_string()));
                    break;
                }
            };

            report.summary.record_dispatch();
            let sequence = report.summary.dispatched;
            let key = InFlight {
                sequence,
                method: request.method.clone(),
                url: request.url.clone(),
            };
            let id = tasks
                .spawn(dispatch(
                    Arc::clone(&self.transport),
                    name.clone(),
                    sequence,
                    request,
                    permit,
                ))
                .id();
            in_flight.insert(id, key);
            tracing::trace!(
                archive = %name,
                sequence,
                in_flight = self.limiter.in_flight(),
                "dispatched"
            );

            while let Some(joined) = tasks.try_join_next_with_id() {
                collect(&mut report, &mut in_flight, joined);
            }
        }

        // the reader stops at its next send once nobody is receiving
        drop(incoming);
        match reader.await {
            Ok(tally) => report.summary.record_reads(tally.records, tally.skipped),
            Err(err) => {
                tracing::error!(archive = %name, error = %err, "record reader failed");
                if report.error.is_none() {
                    report.error = Some(ReplayError::Scheduler(format!("record reader failed: {}", err)));
                }
            }
        }
        self.transition(&name, SchedulerState::Draining);

        while let Some(joined) = tasks.join_next_with_id().await {
            collect(&mut report, &mut in_flight, joined);
        }
        if let Err(err) = self.limiter.drain().await {
            tracing::debug!(archive = %name, error = %err, "limiter closed while draining");
        }

        self.transition(&name, SchedulerState::Done);

        match &report.error {
            Some(err) => tracing::error!(
                archive = %name,
                dispatched = report.summary.dispatched,
                error = %err,
                "aborted replaying {}: {}",
                name,
                err
            ),
            None => tracing::info!(
                archive = %name,
                requests = report.summary.dispatched,
                succeeded = report.summary.succeeded,
                failed = report.summary.failed,
                bytes = report.summary.bytes,
                "finished replaying {}",
                name
            ),
        }

        report
    }

    fn transition(&mut self, archive: &str, next: SchedulerState) {
        tracing::debug!(archive, from = %self.state, to = %next, "scheduler state");
        self.state = next;
    }
}

/// Records seen by the reader
#[derive(Debug, Default)]
struct ReadTally {
    records: u64,
    skipped: u64,
}

/// Read `source` to its end, sending each materialized request in record
/// order. Stops after the first fatal error or when the receiver is gone.
fn read_requests<S: RecordSource>(
    mut source: S,
    requests: &mpsc::Sender<Result<ReplayableRequest, ReplayError>>,
) -> ReadTally {
    let mut tally = ReadTally::default();
    loop {
        match next_request(&mut source, &mut tally) {
            Ok(Some(request)) => {
                if requests.blocking_send(Ok(request)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                let _ = requests.blocking_send(Err(err));
                break;
            }
        }
    }
    tally
}

/// Skip to the next request record and materialize it
fn next_request<S: RecordSource>(
    source: &mut S,
    tally: &mut ReadTally,
) -> Result<Option<ReplayableRequest>, ReplayError> {
    loop {
        let Some(mut record) = source.next_record()? else {
            return Ok(None);
        };
        tally.records += 1;

        if !record.is_request() {
            tracing::trace!(
                record_type = record.header().get("WARC-Type").unwrap_or("unknown"),
                "skipping record"
            );
            tally.skipped += 1;
            continue;
        }

        return materialize(&mut record).map(Some).map_err(|source| ReplayError::Materialize {
            record: record
                .header()
                .record_id()
                .map_or_else(|| format!("#{}", tally.records), str::to_string),
            source,
        });
    }
}

/// Run one request and report it. The permit is held until the outcome has
/// been logged.
async fn dispatch<T: Transport>(
    transport: Arc<T>,
    archive: Arc<str>,
    sequence: u64,
    request: ReplayableRequest,
    permit: InFlightPermit,
) -> ReplayOutcome {
    let method = request.method.clone();
    let url = request.url.clone();
    let result = transport.execute(request).await;
    let outcome = ReplayOutcome::from_result(archive, sequence, method, url, result);
    outcome.log();
    drop(permit);
    outcome
}

/// Fold a finished task into the report. A task that died is reported as
/// aborted under the request it was carrying.
fn collect(
    report: &mut ArchiveReport,
    in_flight: &mut HashMap<Id, InFlight>,
    joined: Result<(Id, ReplayOutcome), JoinError>,
) {
    match joined {
        Ok((id, outcome)) => {
            in_flight.remove(&id);
            report.push(outcome);
        }
        Err(err) => {
            let Some(lost) = in_flight.remove(&err.id()) else {
                tracing::error!(archive = %report.archive, error = %err, "unknown dispatch task failed");
                return;
            };
            let outcome = ReplayOutcome {
                archive: report.archive.clone(),
                sequence: lost.sequence,
                method: lost.method,
                url: lost.url,
                status: OutcomeStatus::Aborted(err.to_string()),
                bytes: 0,
            };
            outcome.log();
            report.push(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        LogCapture, RecordingTransport, SlowRead, archive, dispatched_urls, get_record,
        post_record, response_record, warc_record,
    };
    use http::StatusCode;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_skips_non_request_records() {
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![
            warc_record("warcinfo", None, b"software: test\r\n"),
            get_record("http://example.test/a"),
            response_record("http://example.test/a"),
            post_record("http://example.test/b", "hello"),
            warc_record("metadata", Some("http://example.test/a"), b"via: x\r\n"),
        ];

        let scheduler = ArchiveScheduler::new(transport.clone(), 6);
        let report = scheduler.run(archive("a.warc", &records)).await;

        assert!(report.is_complete());
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.summary.skipped_records, 3);
        assert_eq!(report.summary.records, 5);
        assert_eq!(report.summary.succeeded, 2);
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.status == OutcomeStatus::Response(StatusCode::OK))
        );
        assert_eq!(dispatched_urls(&report), vec!["http://example.test/a", "http://example.test/b"]);
        // POST body reached the transport
        assert_eq!(report.summary.bytes, 5);
    }

    #[tokio::test]
    async fn test_cap_of_one_is_sequential() {
        let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(10)));
        let records: Vec<_> = (0..3)
            .map(|i| get_record(&format!("http://example.test/{}", i)))
            .collect();

        let report = ArchiveScheduler::new(transport.clone(), 1)
            .run(archive("a.warc", &records))
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(transport.high_water(), 1);
        assert_eq!(
            transport.seen(),
            vec![
                "http://example.test/0",
                "http://example.test/1",
                "http://example.test/2"
            ]
        );
        // with one slot, completion order is dispatch order
        let completed: Vec<_> = report.outcomes.iter().map(|o| o.sequence).collect();
        assert_eq!(completed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_cap() {
        let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(5)));
        let records: Vec<_> = (0..20)
            .map(|i| get_record(&format!("http://example.test/{}", i)))
            .collect();

        let report = ArchiveScheduler::new(transport.clone(), 3)
            .run(archive("a.warc", &records))
            .await;

        assert_eq!(report.outcomes.len(), 20);
        assert!(transport.high_water() <= 3);
        assert!(transport.high_water() >= 1);
    }

    #[tokio::test]
    async fn test_dispatch_order_matches_record_order() {
        let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(2)));
        let expected: Vec<_> = (0..10).map(|i| format!("http://example.test/{}", i)).collect();
        let records: Vec<_> = expected.iter().map(|url| get_record(url)).collect();

        let report = ArchiveScheduler::new(transport.clone(), 4)
            .run(archive("a.warc", &records))
            .await;

        assert_eq!(dispatched_urls(&report), expected);
        assert_eq!(transport.seen(), expected);
        let mut sequences: Vec<_> = report.outcomes.iter().map(|o| o.sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_request_failures_do_not_stop_the_archive() {
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![
            get_record("http://example.test/fail"),
            get_record("http://example.test/ok"),
        ];

        let report = ArchiveScheduler::new(transport.clone(), 1)
            .run(archive("a.warc", &records))
            .await;

        assert!(report.is_complete());
        assert_eq!(report.summary.completed, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.succeeded, 1);
        // the failed request gave its slot back
        assert_eq!(transport.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_target_aborts_archive() {
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![
            get_record("http://example.test/a"),
            get_record("not a uri"),
            get_record("http://example.test/never"),
        ];

        let report = ArchiveScheduler::new(transport.clone(), 2)
            .run(archive("bad.warc", &records))
            .await;

        assert!(matches!(
            report.error,
            Some(ReplayError::Materialize {
                ref record,
                source: crate::materialize::MaterializeError::InvalidTarget { .. },
            }) if record == "#2"
        ));
        // the request dispatched before the bad record still completes
        assert_eq!(report.outcomes.len(), 1);
        assert!(!transport.seen().contains(&"http://example.test/never".to_string()));
    }

    #[tokio::test]
    async fn test_truncated_archive_aborts() {
        let transport = Arc::new(RecordingTransport::default());
        // cut inside the header block
        let mut broken = get_record("http://example.test/b");
        broken.truncate(20);
        let records = vec![get_record("http://example.test/a"), broken];

        let report = ArchiveScheduler::new(transport, 6)
            .run(archive("short.warc", &records))
            .await;

        assert!(matches!(report.error, Some(ReplayError::Archive(_))));
        assert_eq!(report.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_archive() {
        let transport = Arc::new(RecordingTransport::default());
        let report = ArchiveScheduler::new(transport, 6)
            .run(archive("empty.warc", &[]))
            .await;
        assert!(report.is_complete());
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_reading_does_not_stall_in_flight_requests() {
        let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(10)));
        let mut bytes = get_record("http://example.test/first");
        let filler = vec![b'x'; 8 * 1024];
        for _ in 0..20 {
            bytes.extend(warc_record("response", Some("http://example.test/big"), &filler));
        }
        let slow = Archive::from_reader("slow.warc", SlowRead::new(bytes, Duration::from_millis(20)))
            .unwrap();

        let started = Instant::now();
        let report = ArchiveScheduler::new(transport.clone(), 6).run(slow).await;
        let total = started.elapsed();

        assert!(report.is_complete());
        assert_eq!(report.summary.records, 21);
        assert_eq!(report.summary.skipped_records, 20);
        let first_done = transport.finished()[0].duration_since(started);
        assert!(
            first_done < total / 2,
            "request finished after {:?} of a {:?} run",
            first_done,
            total
        );
    }

    #[tokio::test]
    async fn test_latin1_target_is_replayed_byte_for_byte() {
        let transport = Arc::new(RecordingTransport::default());
        let content = b"GET /caf%E9 HTTP/1.1\r\nHost: example.test\r\n\r\n";
        let mut record = b"WARC/1.1\r\nWARC-Type: request\r\nWARC-Target-URI: http://example.test/caf\xE9\r\n".to_vec();
        record.extend(format!("Content-Length: {}\r\n\r\n", content.len()).into_bytes());
        record.extend_from_slice(content);
        record.extend_from_slice(b"\r\n\r\n");

        let report = ArchiveScheduler::new(transport.clone(), 1)
            .run(archive("latin1.warc", &[record]))
            .await;

        assert!(report.is_complete());
        assert_eq!(transport.seen(), vec!["http://example.test/caf%E9"]);
    }

    #[tokio::test]
    async fn test_log_lines_per_request_and_finish() {
        let (logs, _guard) = LogCapture::install();
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![
            get_record("http://example.test/a"),
            response_record("http://example.test/a"),
            get_record("http://example.test/fail"),
        ];

        ArchiveScheduler::new(transport, 2)
            .run(archive("a.warc", &records))
            .await;

        assert_eq!(logs.count("200 OK (0 bytes) GET http://example.test/a a.warc"), 1);
        assert_eq!(
            logs.count("request failed: connection refused (0 bytes) GET http://example.test/fail a.warc"),
            1
        );
        assert_eq!(logs.count_at("WARN"), 1);
        assert_eq!(logs.count("finished replaying a.warc"), 1);
        assert_eq!(logs.count("aborted replaying"), 0);
    }

    #[tokio::test]
    async fn test_log_line_for_aborted_archive() {
        let (logs, _guard) = LogCapture::install();
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![get_record("http://example.test/a"), get_record("not a uri")];

        ArchiveScheduler::new(transport, 2)
            .run(archive("bad.warc", &records))
            .await;

        assert_eq!(logs.count("aborted replaying bad.warc: Record #2"), 1);
        assert_eq!(logs.count_at("ERROR"), 1);
        assert_eq!(logs.count("finished replaying"), 0);
        // the request read before the bad record is still reported
        assert_eq!(logs.count("bytes) GET http://example.test/a bad.warc"), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::Running.to_string(), "running");
        assert_eq!(SchedulerState::Draining.to_string(), "draining");
        assert_eq!(SchedulerState::Done.to_string(), "done");
    }
}
