//! Scan coordinator - drives a rescan session through its phases
//!
//! ```text
//! Idle -> EnumeratingFiles -> ReconcilingIndex -> Dispatching -> Completed
//!              |
//!              +-> Error (bad root)
//! ```
//!
//! The walk and the reconciliation run on a dedicated worker thread. The
//! worker, the indexing service and the coordinator talk through a single
//! event queue that only the coordinator consumes, so phase, progress,
//! the work list cursor and the diagnostic log all have one owner. Every
//! event carries the id of the session that produced it; events from a
//! torn-down session are dropped.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::ScanConfig;
use crate::correlator::{CompletionCorrelator, Correlation};
use crate::error::ScanError;
use crate::index::IndexSource;
use crate::indexer::IndexingService;
use crate::models::{ScanOutcome, ScanSummary};
use crate::path_set::CanonicalPath;
use crate::progress::{DiagnosticLog, NullObserver, ScanObserver, ScanPhase};
use crate::reconcile::{IndexReadStatus, ReconcileEvent, Reconciler};
use crate::walker::TreeWalker;
use crate::worklist::WorkList;

/// Identifier of one scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
enum EngineEvent {
    Phase(ScanPhase),
    Progress(u8),
    Status(String),
    Diagnostic(String),
    Failed(ScanError),
    Prepared(WorkList),
    Completion(PathBuf),
}

#[derive(Debug)]
struct Envelope {
    session: SessionId,
    event: EngineEvent,
}

/// Handle given to the indexing service to report finished paths.
///
/// Completions are queued for the coordinator; reports for a session
/// that is no longer live are discarded when they are processed.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    session: SessionId,
    tx: Sender<Envelope>,
}

impl CompletionSink {
    /// Session the sink reports to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report that `path` has been indexed
    pub fn complete(&self, path: impl Into<PathBuf>) {
        let envelope = Envelope {
            session: self.session,
            event: EngineEvent::Completion(path.into()),
        };
        // The coordinator is gone; nobody is waiting for this completion
        let _ = self.tx.send(envelope);
    }
}

struct Session {
    id: SessionId,
    root: Option<CanonicalPath>,
    started: Instant,
    finished: Option<Instant>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    correlator: Option<CompletionCorrelator>,
    outcome: Option<ScanOutcome>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            root: None,
            started: Instant::now(),
            finished: None,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            correlator: None,
            outcome: None,
        }
    }

    fn close(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

/// Everything the background worker needs for the walk and reconcile phases
struct PrepareJob {
    session: SessionId,
    root: CanonicalPath,
    walker: TreeWalker,
    reconciler: Reconciler,
    index: Arc<dyn IndexSource>,
    cancel: Arc<AtomicBool>,
    tx: Sender<Envelope>,
}

impl PrepareJob {
    fn send(&self, event: EngineEvent) {
        let _ = self.tx.send(Envelope {
            session: self.session,
            event,
        });
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run(self) {
        let walked = match self.walker.walk_until(&self.root, &self.cancel) {
            Ok(walked) => walked,
            Err(err) => {
                self.send(EngineEvent::Failed(err));
                return;
            }
        };
        for diagnostic in &walked.diagnostics {
            self.send(EngineEvent::Diagnostic(diagnostic.to_string()));
        }
        if walked.cancelled || self.cancelled() {
            log::debug!("Session {} cancelled during walk", self.session);
            return;
        }
        log::info!(
            "Walk of {} found {} path(s)",
            self.root,
            walked.candidates.len()
        );

        let mut candidates = walked.candidates;
        self.send(EngineEvent::Phase(ScanPhase::ReconcilingIndex));

        let outcome = self.reconciler.reconcile(
            &mut candidates,
            self.index.as_ref(),
            &mut |event| match event {
                ReconcileEvent::Progress { percent, path } => {
                    self.send(EngineEvent::Status(format!("Checking index: {}", path)));
                    self.send(EngineEvent::Progress(percent));
                }
                ReconcileEvent::Retrying { attempt, error } => {
                    self.send(EngineEvent::Status(
                        "Index read failed, retrying...".to_string(),
                    ));
                    self.send(EngineEvent::Diagnostic(format!(
                        "Index read attempt {} failed: {}",
                        attempt, error.message
                    )));
                }
                ReconcileEvent::Unresolved { entry, error } => {
                    self.send(EngineEvent::Diagnostic(format!(
                        "Skipping index entry {}: {}",
                        entry.path.display(),
                        error.message
                    )));
                }
            },
        );
        if let Some(line) = outcome.status_diagnostic() {
            self.send(EngineEvent::Diagnostic(line));
        }
        if !matches!(outcome.status, IndexReadStatus::Degraded { .. }) {
            self.send(EngineEvent::Diagnostic(outcome.summary()));
        }
        if self.cancelled() {
            log::debug!("Session {} cancelled during reconciliation", self.session);
            return;
        }

        self.send(EngineEvent::Prepared(WorkList::build(candidates)));
    }
}

/// Stateful rescan engine.
///
/// All state changes happen on the thread that calls into the coordinator
/// ([`process_pending`](Self::process_pending),
/// [`wait_until_terminal`](Self::wait_until_terminal), ...). Observers are
/// notified on that thread too.
pub struct ScanCoordinator {
    config: ScanConfig,
    index: Arc<dyn IndexSource>,
    indexer: Box<dyn IndexingService>,
    observer: Box<dyn ScanObserver>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    sessions_started: u64,
    session: Option<Session>,
    phase: ScanPhase,
    progress: u8,
    status: String,
    diagnostics: DiagnosticLog,
}

impl ScanCoordinator {
    /// Create an idle coordinator
    pub fn new(
        config: ScanConfig,
        index: Arc<dyn IndexSource>,
        indexer: Box<dyn IndexingService>,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            config,
            index,
            indexer,
            observer: Box::new(NullObserver),
            tx,
            rx,
            sessions_started: 0,
            session: None,
            phase: ScanPhase::Idle,
            progress: 0,
            status: ScanPhase::Idle.label().to_string(),
            diagnostics: DiagnosticLog::new(),
        }
    }

    /// Replace the observer
    pub fn with_observer(mut self, observer: Box<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Current percentage within the phase
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Whether any scan was ever started
    pub fn has_started(&self) -> bool {
        self.sessions_started > 0
    }

    /// Whether a new scan may be started now
    pub fn can_start(&self) -> bool {
        !self.phase.is_active()
    }

    /// Work list of the live session, once built
    pub fn work_list(&self) -> Option<&WorkList> {
        self.correlator().map(CompletionCorrelator::work_list)
    }

    /// Progress cursor of the live session, once dispatching
    pub fn cursor(&self) -> Option<isize> {
        self.correlator().map(CompletionCorrelator::cursor)
    }

    fn correlator(&self) -> Option<&CompletionCorrelator> {
        self.session.as_ref().and_then(|s| s.correlator.as_ref())
    }

    /// Start a new session rooted at `root`.
    ///
    /// Fails with `ScanInProgress` while another session is running and with
    /// `BadRoot` when the root cannot be resolved; the latter also reaches
    /// the observer as a terminal error.
    pub fn start_scan(&mut self, root: &Path) -> Result<SessionId, ScanError> {
        if self.phase.is_active() {
            return Err(ScanError::scan_in_progress());
        }
        if let Some(mut previous) = self.session.take() {
            previous.close();
        }

        self.sessions_started += 1;
        let id = SessionId(self.sessions_started);
        self.session = Some(Session::new(id));
        self.diagnostics.reset();
        log::info!("Starting scan {} of {}", id, root.display());
        self.set_phase(ScanPhase::EnumeratingFiles);

        let root = match CanonicalPath::resolve(root) {
            Ok(root) => root,
            Err(err) => {
                log::debug!("Root resolution failed: {}", err);
                let err = ScanError::bad_root(root.to_path_buf());
                self.fail(&err);
                return Err(err);
            }
        };

        let (cancel, job_root) = match self.session.as_mut() {
            Some(session) => {
                session.root = Some(root.clone());
                (Arc::clone(&session.cancel), root)
            }
            None => return Err(ScanError::scan_in_progress()),
        };

        let job = PrepareJob {
            session: id,
            root: job_root,
            walker: TreeWalker::new(&self.config),
            reconciler: Reconciler::new(&self.config),
            index: Arc::clone(&self.index),
            cancel,
            tx: self.tx.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("rescan-{}", id.get()))
            .spawn(move || job.run());

        match spawned {
            Ok(handle) => {
                if let Some(session) = self.session.as_mut() {
                    session.worker = Some(handle);
                }
                Ok(id)
            }
            Err(e) => {
                let err = ScanError::io_error(None, format!("Cannot start scan worker: {}", e));
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Tear down the live session. Returns false when nothing was running.
    ///
    /// The worker is told to stop and any event it or the indexer still
    /// produces for this session is discarded.
    pub fn cancel(&mut self) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        if let Some(mut session) = self.session.take() {
            log::info!("Cancelling scan {}", session.id);
            session.close();
        }
        self.set_phase(ScanPhase::Idle);
        self.observer.on_terminal(&ScanOutcome::Cancelled);
        true
    }

    /// Apply every queued event without blocking. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            self.handle(envelope);
            handled += 1;
        }
        handled
    }

    /// Block for at most `timeout` waiting for one event. Returns true if one was handled.
    pub fn wait_event(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.handle(envelope);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Process events until the live session ends or `timeout` passes.
    /// Returns true if the session reached a terminal phase.
    pub fn wait_until_terminal(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.phase.is_active() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_event(remaining) && Instant::now() >= deadline {
                break;
            }
        }
        self.phase.is_terminal()
    }

    /// Process events until the live session ends and summarize it
    pub fn run_until_terminal(&mut self) -> ScanSummary {
        while self.phase.is_active() {
            match self.rx.recv() {
                Ok(envelope) => self.handle(envelope),
                Err(_) => break,
            }
        }
        self.summary()
    }

    /// Snapshot of the live (or last) session
    pub fn summary(&self) -> ScanSummary {
        let session = self.session.as_ref();
        let correlator = self.correlator();
        ScanSummary {
            session: session.map_or(0, |s| s.id.get()),
            root: session
                .and_then(|s| s.root.as_ref())
                .map(|r| r.as_path().to_path_buf()),
            phase: self.phase,
            outcome: session.and_then(|s| s.outcome.clone()),
            work_items: correlator.map_or(0, |c| c.work_list().len()),
            confirmed: correlator.map_or(0, CompletionCorrelator::confirmed),
            diagnostics: self.diagnostics.len(),
            duration_ms: session.map_or(0, |s| {
                s.finished
                    .unwrap_or_else(Instant::now)
                    .duration_since(s.started)
                    .as_millis() as u64
            }),
            finished_at: Utc::now(),
        }
    }

    fn handle(&mut self, envelope: Envelope) {
        let live = self.session.as_ref().map(|s| s.id);
        if live != Some(envelope.session) {
            log::trace!("Discarding event from stale session {}", envelope.session);
            return;
        }

        match envelope.event {
            EngineEvent::Phase(phase) => {
                if self.phase.is_active() {
                    self.set_phase(phase);
                }
            }
            EngineEvent::Progress(percent) => {
                if self.phase.is_active() {
                    self.set_progress(percent);
                }
            }
            EngineEvent::Status(text) => {
                if self.phase.is_active() {
                    self.set_status(text);
                }
            }
            EngineEvent::Diagnostic(line) => self.add_diagnostic(line),
            EngineEvent::Failed(err) => self.fail(&err),
            EngineEvent::Prepared(work_list) => self.dispatch(work_list),
            EngineEvent::Completion(path) => self.on_completion(&path),
        }
    }

    fn dispatch(&mut self, work_list: WorkList) {
        if !matches!(
            self.phase,
            ScanPhase::EnumeratingFiles | ScanPhase::ReconcilingIndex
        ) {
            return;
        }
        self.set_phase(ScanPhase::Dispatching);
        self.add_diagnostic(format!("{} path(s) to index", work_list.len()));

        if self.config.log_work_list {
            self.add_diagnostic("Scanning paths:");
            for path in &work_list {
                self.add_diagnostic(path.to_string());
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.correlator = Some(CompletionCorrelator::new(work_list.clone()));
        let sink = CompletionSink {
            session: session.id,
            tx: self.tx.clone(),
        };

        if work_list.is_empty() {
            self.complete();
            return;
        }
        self.indexer.dispatch(work_list, sink);
    }

    fn on_completion(&mut self, path: &Path) {
        if self.phase != ScanPhase::Dispatching {
            return;
        }
        let Some(correlator) = self.session.as_mut().and_then(|s| s.correlator.as_mut()) else {
            return;
        };

        let update = correlator.on_completion(path);
        if update.complete {
            self.complete();
        } else if update.correlation != Correlation::Unmatched {
            self.set_progress(update.percent);
            self.set_status(format!("Processing: {}", path.display()));
        }
    }

    fn complete(&mut self) {
        let items = self.work_list().map_or(0, WorkList::len);
        let outcome = ScanOutcome::Success { items };

        self.set_phase(ScanPhase::Completed);
        if let Some(session) = self.session.as_mut() {
            session.finished = Some(Instant::now());
            session.outcome = Some(outcome.clone());
        }
        log::info!("Scan completed: {} path(s) indexed", items);
        self.observer.on_terminal(&outcome);
    }

    fn fail(&mut self, err: &ScanError) {
        self.add_diagnostic(format!("Scan failed: {}", err.message));
        self.set_phase(ScanPhase::Error);
        self.set_status(format!("{}: {}", ScanPhase::Error.label(), err.message));
        let outcome = ScanOutcome::Error {
            message: err.message.clone(),
        };
        if let Some(session) = self.session.as_mut() {
            session.finished = Some(Instant::now());
            session.outcome = Some(outcome.clone());
        }
        log::error!("Scan failed: {}", err);
        self.observer.on_terminal(&outcome);
    }

    /// Progress restarts at 0 on every phase change, except that
    /// `Completed` goes straight to 100.
    fn set_phase(&mut self, phase: ScanPhase) {
        self.phase = phase;
        self.progress = if phase == ScanPhase::Completed { 100 } else { 0 };
        self.status = phase.label().to_string();
        self.observer.on_phase_changed(phase);
        self.observer.on_status(&self.status);
        self.observer.on_progress(self.progress);
    }

    fn set_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
        self.observer.on_progress(self.progress);
    }

    fn set_status(&mut self, text: String) {
        self.status = text;
        self.observer.on_status(&self.status);
    }

    fn add_diagnostic(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("{}", line);
        self.observer.on_diagnostic(&line);
        self.diagnostics.push(line);
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.close();
        }
    }
}
