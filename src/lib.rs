//! Incremental media index rescan engine
//!
//! Walks a directory tree with symlink-cycle, exclusion-marker and
//! alias-root handling, reconciles the result against a persisted media
//! index, and tracks an external indexing service's out-of-order
//! completions as monotonic progress.

pub mod config;
pub mod coordinator;
pub mod correlator;
pub mod db;
pub mod error;
pub mod index;
pub mod indexer;
pub mod models;
pub mod path_set;
pub mod progress;
pub mod reconcile;
pub mod walker;
pub mod worklist;

pub use config::ScanConfig;
pub use coordinator::{CompletionSink, ScanCoordinator, SessionId};
pub use correlator::{CompletionCorrelator, CompletionUpdate, Correlation};
pub use db::{MediaIndex, ScanDatabase};
pub use error::{ScanError, ScanErrorKind};
pub use index::{IndexEntry, IndexSource};
pub use indexer::{IndexingService, LocalIndexer};
pub use models::{IndexRecord, MediaType, ScanOutcome, ScanSummary};
pub use path_set::{CanonicalPath, PathSet};
pub use progress::{
    DiagnosticLog, LogObserver, NullObserver, ProgressReporter, ScanObserver, ScanPhase,
};
pub use reconcile::{IndexReadStatus, ReconcileEvent, ReconcileOutcome, Reconciler};
pub use walker::{TreeWalker, WalkDiagnostic, WalkOutcome};
pub use worklist::WorkList;
