//! Whole-run coordination.
//!
//! Every archive gets its own scheduler task and its own limiter; the only
//! thing they share is the transport. The run finishes when every scheduler
//! has finished, whether it completed or aborted.

use crate::client::{ClientError, ReplayClient, Transport};
use crate::error::ReplayError;
use crate::outcome::ArchiveReport;
use crate::scheduler::ArchiveScheduler;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;
use warcreplay_archive::{Archive, ArchiveReader, RecordSource};
use warcreplay_core::{CoreError, CoreResult, ReplayConfig};

/// Open every archive before replay starts.
///
/// # Errors
///
/// Returns the first archive that cannot be opened; nothing is replayed
/// in that case
pub fn open_archives<P: AsRef<Path>>(paths: &[P]) -> CoreResult<Vec<Archive<ArchiveReader>>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            Archive::open(path).map_err(|err| err.into_core(&path.display().to_string()))
        })
        .collect()
}

/// Replays a set of archives concurrently
pub struct ReplayRun<T> {
    transport: Arc<T>,
    concurrency: usize,
}

impl ReplayRun<ReplayClient> {
    /// Build the shared client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn from_config(config: &ReplayConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = ReplayClient::new(&config.client)?;
        Ok(Self::new(Arc::new(client), config))
    }
}

impl<T: Transport> ReplayRun<T> {
    /// Create a run over an existing transport
    #[must_use]
    pub fn new(transport: Arc<T>, config: &ReplayConfig) -> Self {
        Self {
            transport,
            concurrency: config.concurrency,
        }
    }

    /// Replay all archives and wait for every one of them
    pub async fn run<S>(&self, archives: Vec<Archive<S>>) -> RunReport
    where
        S: RecordSource + Send + 'static,
    {
        let mut handles = Vec::with_capacity(archives.len());

        for archive in archives {
            let name: Arc<str> = Arc::from(archive.name());
            let span = tracing::info_span!("archive", name = %name);
            let scheduler = ArchiveScheduler::new(Arc::clone(&self.transport), self.concurrency);
            handles.push((name, tokio::spawn(scheduler.run(archive).instrument(span))));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(archive = %name, error = %err, "scheduler task failed");
                    let mut report = ArchiveReport::new(name);
                    report.error = Some(ReplayError::Scheduler(err.to_string()));
                    reports.push(report);
                }
            }
        }

        let report = RunReport { archives: reports };
        tracing::info!(
            archives = report.archives.len(),
            aborted = report.aborted().count(),
            requests = report.total_requests(),
            "all done"
        );
        report
    }
}

/// Reports of every archive in a run, in input order
#[derive(Debug, Default)]
pub struct RunReport {
    /// One report per archive
    pub archives: Vec<ArchiveReport>,
}

impl RunReport {
    /// Requests dispatched across all archives
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.archives.iter().map(|a| a.summary.dispatched).sum()
    }

    /// Archives that ended with a fatal error
    pub fn aborted(&self) -> impl Iterator<Item = &ArchiveReport> {
        self.archives.iter().filter(|a| !a.is_complete())
    }

    /// Whether every archive was read to its end
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.archives.iter().all(ArchiveReport::is_complete)
    }

    /// Consume the report, keeping one error per aborted archive
    #[must_use]
    pub fn into_failures(self) -> Vec<CoreError> {
        self.archives
            .into_iter()
            .filter_map(|report| {
                let archive = report.archive;
                report.error.map(|err| err.into_core(&archive))
            })
            .collect()
    }
}
