//! Read side of the persisted media index

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ScanError;

/// One entry of the persisted media index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path as recorded by the index (not necessarily canonical)
    pub path: PathBuf,
    /// Modification time known to the index, Unix seconds
    pub modified: i64,
}

impl IndexEntry {
    pub fn new(path: impl Into<PathBuf>, modified: i64) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }
}

/// Bulk snapshot access to a persisted media index.
///
/// The store may be mutated concurrently by its owner; a read returns
/// whatever consistent snapshot the store can give.
pub trait IndexSource: Send + Sync {
    /// Read every entry of the index
    fn load_entries(&self) -> Result<Vec<IndexEntry>, ScanError>;
}

impl IndexSource for Vec<IndexEntry> {
    fn load_entries(&self) -> Result<Vec<IndexEntry>, ScanError> {
        Ok(self.clone())
    }
}

impl<T: IndexSource + ?Sized> IndexSource for std::sync::Arc<T> {
    fn load_entries(&self) -> Result<Vec<IndexEntry>, ScanError> {
        (**self).load_entries()
    }
}
