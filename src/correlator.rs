//! Completion correlator - turns out-of-order completions into a monotonic
//! progress cursor over the work list
//!
//! The indexer works on many paths at once, so completions arrive in any
//! order. The common near-sequential case is matched against the next
//! expected entry; anything else falls back to a lookup in the sorted list.
//! The cursor never moves backwards.

use std::path::{Path, PathBuf};

use crate::worklist::WorkList;

/// How a completion related to the work list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The next expected path completed
    Next,
    /// A later path completed; the cursor jumped forward
    Jumped,
    /// The path is at or behind the cursor
    Behind,
    /// The path is not in the work list
    Unmatched,
}

/// State after applying a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionUpdate {
    pub correlation: Correlation,
    pub cursor: isize,
    pub percent: u8,
    pub complete: bool,
}

/// Tracks the highest confirmed work list index
#[derive(Debug, Clone)]
pub struct CompletionCorrelator {
    work_list: WorkList,
    last_confirmed: Option<usize>,
}

impl CompletionCorrelator {
    /// Start tracking a freshly built work list; nothing is confirmed yet
    pub fn new(work_list: WorkList) -> Self {
        Self {
            work_list,
            last_confirmed: None,
        }
    }

    pub fn work_list(&self) -> &WorkList {
        &self.work_list
    }

    /// Highest confirmed index, -1 when nothing is confirmed
    pub fn cursor(&self) -> isize {
        self.last_confirmed.map_or(-1, |i| i as isize)
    }

    /// Number of work list entries at or below the cursor
    pub fn confirmed(&self) -> usize {
        self.last_confirmed.map_or(0, |i| i + 1)
    }

    /// floor(100 * confirmed / len)
    pub fn percent(&self) -> u8 {
        if self.work_list.is_empty() {
            return 100;
        }
        (100 * self.confirmed() / self.work_list.len()) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.percent() == 100
    }

    /// Apply one completion notification
    pub fn on_completion(&mut self, reported: &Path) -> CompletionUpdate {
        let reported = normalize(reported);
        let next = self.confirmed();

        let correlation = match self.work_list.get(next) {
            Some(expected) if expected.as_bytes() == reported.as_os_str().as_encoded_bytes() => {
                self.last_confirmed = Some(next);
                Correlation::Next
            }
            _ => match self.work_list.position(&reported) {
                Some(index) if self.last_confirmed.map_or(true, |last| index > last) => {
                    self.last_confirmed = Some(index);
                    Correlation::Jumped
                }
                Some(_) => Correlation::Behind,
                None => {
                    log::trace!("Completion for unknown path {}", reported.display());
                    Correlation::Unmatched
                }
            },
        };

        CompletionUpdate {
            correlation,
            cursor: self.cursor(),
            percent: self.percent(),
            complete: self.is_complete(),
        }
    }
}

/// Drop redundant separators and `.` components the indexer may add
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
