//! Progress reporting for rescan sessions
//!
//! The coordinator publishes phase changes, percentages, status text,
//! diagnostics and the terminal outcome through [`ScanObserver`]. Two
//! observers ship with the crate: [`ProgressReporter`] writes JSON lines
//! for external callers, [`LogObserver`] forwards everything to `log`.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::models::ScanOutcome;

/// Scan phase indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No scan has been requested yet, or the last one was cancelled
    #[default]
    Idle,
    /// Walking the storage tree
    EnumeratingFiles,
    /// Merging the walk against the persisted index
    ReconcilingIndex,
    /// Work list handed to the indexer, waiting for completions
    Dispatching,
    /// Scan finished
    Completed,
    /// Scan could not start
    Error,
}

impl ScanPhase {
    /// Get string representation of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::EnumeratingFiles => "enumerating_files",
            ScanPhase::ReconcilingIndex => "reconciling_index",
            ScanPhase::Dispatching => "dispatching",
            ScanPhase::Completed => "completed",
            ScanPhase::Error => "error",
        }
    }

    /// Human-readable phase label
    pub fn label(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "Not started",
            ScanPhase::EnumeratingFiles => "Building file list...",
            ScanPhase::ReconcilingIndex => "Checking media index...",
            ScanPhase::Dispatching => "Indexing files...",
            ScanPhase::Completed => "Scan completed",
            ScanPhase::Error => "Scan failed",
        }
    }

    /// Whether a session in this phase is finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Error)
    }

    /// Whether a session in this phase is still running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ScanPhase::EnumeratingFiles | ScanPhase::ReconcilingIndex | ScanPhase::Dispatching
        )
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only consumer of session updates.
///
/// All calls happen on the coordinator's owning thread, after the state
/// they describe has been updated.
pub trait ScanObserver {
    fn on_phase_changed(&mut self, phase: ScanPhase);
    fn on_progress(&mut self, percent: u8);
    fn on_diagnostic(&mut self, line: &str);
    fn on_terminal(&mut self, outcome: &ScanOutcome);

    /// Free-form status text, e.g. the path being processed
    fn on_status(&mut self, _text: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_phase_changed(&mut self, _phase: ScanPhase) {}
    fn on_progress(&mut self, _percent: u8) {}
    fn on_diagnostic(&mut self, _line: &str) {}
    fn on_terminal(&mut self, _outcome: &ScanOutcome) {}
}

/// Append-only diagnostic log of one session
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    lines: Vec<String>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whole log, one line per entry
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Start over for a new session
    pub(crate) fn reset(&mut self) {
        self.lines.clear();
    }
}

/// Start message sent when a scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Scan root path
    pub root: String,
}

impl StartMessage {
    pub fn new(seq: u64, ts: u64, root: String) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
        }
    }
}

/// Phase change message
#[derive(Debug, Clone, Serialize)]
pub struct PhaseMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub phase: ScanPhase,
    /// Human-readable phase label
    pub label: &'static str,
}

impl PhaseMessage {
    pub fn new(seq: u64, ts: u64, phase: ScanPhase) -> Self {
        Self {
            msg_type: "phase",
            seq,
            ts,
            phase,
            label: phase.label(),
        }
    }
}

/// Progress message sent during a scan
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Current scan phase
    pub phase: ScanPhase,
    /// Percentage within the phase
    #[serde(rename = "pct")]
    pub percent: u8,
    /// Latest status text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ProgressMessage {
    pub fn new(seq: u64, ts: u64, phase: ScanPhase, percent: u8, text: Option<String>) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            phase,
            percent,
            text,
        }
    }
}

/// Diagnostic line message
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub line: String,
}

impl DiagnosticMessage {
    pub fn new(seq: u64, ts: u64, line: String) -> Self {
        Self {
            msg_type: "diag",
            seq,
            ts,
            line,
        }
    }
}

/// Done message sent when a scan reaches a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Terminal outcome
    #[serde(flatten)]
    pub outcome: ScanOutcome,
    /// Number of diagnostics reported
    #[serde(rename = "dc")]
    pub diagnostic_count: u64,
}

impl DoneMessage {
    pub fn new(seq: u64, ts: u64, outcome: ScanOutcome, diagnostic_count: u64) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            outcome,
            diagnostic_count,
        }
    }
}

/// Observer writing JSON lines (stderr by default)
///
/// Phase changes, diagnostics and the terminal message are written
/// immediately. Progress lines are throttled to one per interval, except
/// for 100%.
pub struct ProgressReporter<W: Write = std::io::Stderr> {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last progress report time
    last_report: Option<Instant>,
    /// Sequence number for messages
    seq: u64,
    /// Start time of the reporter
    start_time: Instant,
    phase: ScanPhase,
    status: Option<String>,
    diagnostic_count: u64,
    out: W,
}

impl ProgressReporter {
    /// Create a reporter writing to stderr
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self::with_writer(enabled, interval_ms, std::io::stderr())
    }
}

impl<W: Write> ProgressReporter<W> {
    /// Create a reporter writing to `out`
    pub fn with_writer(enabled: bool, interval_ms: u64, out: W) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report: None,
            seq: 0,
            start_time: Instant::now(),
            phase: ScanPhase::Idle,
            status: None,
            diagnostic_count: 0,
            out,
        }
    }

    /// Check if enough time has passed since the last progress report
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_report {
            None => true,
            Some(last) => last.elapsed().as_millis() as u64 >= self.interval_ms,
        }
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Write a serializable message as one JSON line
    pub fn output<T: Serialize>(&mut self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            writeln!(self.out, "{}", json).ok();
            self.out.flush().ok();
        }
    }

    /// Report scan start
    pub fn report_start(&mut self, root: &Path) {
        if !self.enabled {
            return;
        }
        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            root.to_string_lossy().into_owned(),
        );
        self.output(&msg);
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Consume the reporter and return its writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ScanObserver for ProgressReporter<W> {
    fn on_phase_changed(&mut self, phase: ScanPhase) {
        self.phase = phase;
        self.status = None;
        if !self.enabled {
            return;
        }
        let msg = PhaseMessage::new(self.next_seq(), self.current_timestamp(), phase);
        self.output(&msg);
    }

    fn on_progress(&mut self, percent: u8) {
        if !self.enabled || (percent < 100 && !self.should_report()) {
            return;
        }
        let msg = ProgressMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            self.phase,
            percent,
            self.status.clone(),
        );
        self.output(&msg);
        self.last_report = Some(Instant::now());
    }

    fn on_diagnostic(&mut self, line: &str) {
        self.diagnostic_count += 1;
        if !self.enabled {
            return;
        }
        let msg = DiagnosticMessage::new(self.next_seq(), self.current_timestamp(), line.to_string());
        self.output(&msg);
    }

    fn on_terminal(&mut self, outcome: &ScanOutcome) {
        if !self.enabled {
            return;
        }
        let msg = DoneMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            outcome.clone(),
            self.diagnostic_count,
        );
        self.output(&msg);
    }

    fn on_status(&mut self, text: &str) {
        self.status = Some(text.to_string());
    }
}

/// Observer forwarding updates to the `log` facade
#[derive(Debug, Default)]
pub struct LogObserver {
    last_logged_decile: Option<u8>,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanObserver for LogObserver {
    fn on_phase_changed(&mut self, phase: ScanPhase) {
        self.last_logged_decile = None;
        log::info!("{}", phase.label());
    }

    fn on_progress(&mut self, percent: u8) {
        let decile = percent / 10;
        if self.last_logged_decile != Some(decile) {
            self.last_logged_decile = Some(decile);
            log::info!("Progress: {}%", percent);
        }
    }

    fn on_diagnostic(&mut self, line: &str) {
        log::info!("{}", line);
    }

    fn on_terminal(&mut self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Success { items } => log::info!("Scan finished: {} item(s) indexed", items),
            ScanOutcome::Error { message } => log::error!("Scan failed: {}", message),
            ScanOutcome::Cancelled => log::warn!("Scan cancelled"),
        }
    }

    fn on_status(&mut self, text: &str) {
        log::debug!("{}", text);
    }
}
