//! Index reconciler - merges walk results against the persisted index
//!
//! Entries whose file is gone or newer than the index are added to the
//! candidate set; entries that are up to date are removed from it. The bulk
//! index read is retried a fixed number of times and the scan degrades to
//! walk results alone when it never succeeds.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::index::{IndexEntry, IndexSource};
use crate::models::unix_mtime;
use crate::path_set::{CanonicalPath, PathSet};

/// Event published while reconciling
#[derive(Debug)]
pub enum ReconcileEvent<'a> {
    /// Fraction of index entries processed so far
    Progress { percent: u8, path: &'a CanonicalPath },
    /// An index read failed and will be attempted again
    Retrying { attempt: u32, error: &'a ScanError },
    /// An index entry could not be resolved and was skipped
    Unresolved { entry: &'a IndexEntry, error: &'a ScanError },
}

/// How the bulk index read went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexReadStatus {
    /// First attempt succeeded
    Clean,
    /// A later attempt succeeded after `failed_attempts` failures
    Recovered { failed_attempts: u32 },
    /// Every attempt failed; no reconciliation was applied
    Degraded { attempts: u32 },
}

/// Summary of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub status: IndexReadStatus,
    /// Index entries examined
    pub entries: usize,
    /// Paths added because they were stale or missing
    pub added: usize,
    /// Paths removed because they were up to date
    pub removed: usize,
    /// Entries whose path could not be resolved
    pub unresolved: usize,
}

impl ReconcileOutcome {
    fn with_status(status: IndexReadStatus) -> Self {
        Self {
            status,
            entries: 0,
            added: 0,
            removed: 0,
            unresolved: 0,
        }
    }

    /// Diagnostic line describing a retried or failed index read
    pub fn status_diagnostic(&self) -> Option<String> {
        match self.status {
            IndexReadStatus::Clean => None,
            IndexReadStatus::Recovered { failed_attempts } => Some(format!(
                "Index read recovered after {} failed attempt(s)",
                failed_attempts
            )),
            IndexReadStatus::Degraded { attempts } => Some(format!(
                "Index unavailable after {} attempt(s); continuing with walk results only",
                attempts
            )),
        }
    }

    /// Diagnostic line summarizing the merge
    pub fn summary(&self) -> String {
        format!(
            "Index reconciled: {} entries, {} added, {} removed, {} unresolved",
            self.entries, self.added, self.removed, self.unresolved
        )
    }
}

/// Picks a reporting stride once per pass so progress updates stay near
/// one per target interval.
#[derive(Debug)]
struct ReportCadence {
    target: Duration,
    started: Instant,
    stride: Option<usize>,
}

impl ReportCadence {
    fn new(target: Duration) -> Self {
        Self {
            target,
            started: Instant::now(),
            stride: None,
        }
    }

    /// Returns true when progress should be reported for item `current` (1-based)
    fn tick(&mut self, current: usize) -> bool {
        match self.stride {
            None => {
                if self.started.elapsed() >= self.target {
                    self.stride = Some(current + 1);
                }
                false
            }
            Some(stride) => current % stride == 0,
        }
    }
}

/// Whether the file at `path` must be seen by the indexer again
fn needs_reindex(path: &Path, indexed_modified: i64) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) => unix_mtime(&metadata) > indexed_modified,
        Err(_) => true,
    }
}

/// Merges candidate sets against an index source
#[derive(Debug, Clone)]
pub struct Reconciler {
    attempts: u32,
    retry_delay: Duration,
    report_target: Duration,
}

impl Reconciler {
    /// Create a reconciler from the scan configuration
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            attempts: config.index_retries.max(1),
            retry_delay: config.retry_delay(),
            report_target: config.report_target(),
        }
    }

    /// Reconcile `candidates` in place against `index`
    pub fn reconcile(
        &self,
        candidates: &mut PathSet,
        index: &dyn IndexSource,
        on_event: &mut dyn FnMut(ReconcileEvent<'_>),
    ) -> ReconcileOutcome {
        let (entries, status) = self.read_with_retry(index, on_event);
        let mut outcome = ReconcileOutcome::with_status(status);

        let Some(entries) = entries else {
            log::error!("Index unavailable, keeping {} walked paths", candidates.len());
            return outcome;
        };

        let total = entries.len();
        let mut cadence = ReportCadence::new(self.report_target);

        for (i, entry) in entries.iter().enumerate() {
            let current = i + 1;
            outcome.entries = current;

            let path = match CanonicalPath::resolve_lenient(&entry.path) {
                Ok(path) => path,
                Err(error) => {
                    outcome.unresolved += 1;
                    on_event(ReconcileEvent::Unresolved {
                        entry,
                        error: &error,
                    });
                    continue;
                }
            };

            if needs_reindex(&path, entry.modified) {
                if candidates.insert(path.clone()) {
                    log::debug!("Stale index entry added: {}", path);
                    outcome.added += 1;
                }
            } else if candidates.remove(&path) {
                log::debug!("Up to date, skipping: {}", path);
                outcome.removed += 1;
            }

            if cadence.tick(current) {
                let percent = (100 * current / total) as u8;
                on_event(ReconcileEvent::Progress {
                    percent,
                    path: &path,
                });
            }
        }

        log::info!("{}", outcome.summary());
        outcome
    }

    fn read_with_retry(
        &self,
        index: &dyn IndexSource,
        on_event: &mut dyn FnMut(ReconcileEvent<'_>),
    ) -> (Option<Vec<IndexEntry>>, IndexReadStatus) {
        let mut failures = 0;
        loop {
            match index.load_entries() {
                Ok(entries) => {
                    let status = if failures == 0 {
                        IndexReadStatus::Clean
                    } else {
                        IndexReadStatus::Recovered {
                            failed_attempts: failures,
                        }
                    };
                    return (Some(entries), status);
                }
                Err(error) => {
                    failures += 1;
                    log::warn!(
                        "Index read attempt {}/{} failed: {}",
                        failures,
                        self.attempts,
                        error
                    );
                    if failures >= self.attempts {
                        return (None, IndexReadStatus::Degraded { attempts: failures });
                    }
                    on_event(ReconcileEvent::Retrying {
                        attempt: failures,
                        error: &error,
                    });
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }
}
