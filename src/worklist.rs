//! Work list - the frozen, sorted snapshot of a reconciled candidate set

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::path_set::{CanonicalPath, PathSet};

/// Immutable, strictly ascending sequence of paths to index.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    paths: Arc<[CanonicalPath]>,
}

impl WorkList {
    /// Freeze a candidate set
    pub fn build(candidates: PathSet) -> Self {
        Self {
            paths: candidates.into_sorted_vec().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CanonicalPath> {
        self.paths.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalPath> {
        self.paths.iter()
    }

    pub fn as_slice(&self) -> &[CanonicalPath] {
        &self.paths
    }

    /// Index of an exact path match
    pub fn position(&self, path: &Path) -> Option<usize> {
        let key = path.as_os_str().as_encoded_bytes();
        self.paths
            .binary_search_by(|probe| probe.as_bytes().cmp(key))
            .ok()
    }

    /// Paths as plain strings, in order
    pub fn to_strings(&self) -> Vec<String> {
        self.paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    /// Paths as owned path buffers, in order
    pub fn to_path_bufs(&self) -> Vec<PathBuf> {
        self.paths.iter().map(|p| p.as_path().to_path_buf()).collect()
    }
}

impl<'a> IntoIterator for &'a WorkList {
    type Item = &'a CanonicalPath;
    type IntoIter = std::slice::Iter<'a, CanonicalPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_list(paths: &[&str]) -> WorkList {
        WorkList::build(
            paths
                .iter()
                .map(|p| CanonicalPath::assume_canonical(*p))
                .collect(),
        )
    }

    #[test]
    fn test_build_sorts_by_bytes() {
        let list = work_list(&["/s/b.jpg", "/s/a/x.jpg", "/s/a-z.jpg", "/s"]);
        assert_eq!(
            list.to_strings(),
            vec!["/s", "/s/a-z.jpg", "/s/a/x.jpg", "/s/b.jpg"]
        );
    }

    #[test]
    fn test_position_exact_match() {
        let list = work_list(&["/p0", "/p1", "/p2"]);
        assert_eq!(list.position(Path::new("/p0")), Some(0));
        assert_eq!(list.position(Path::new("/p2")), Some(2));
        assert_eq!(list.position(Path::new("/p3")), None);
    }

    #[test]
    fn test_empty_list() {
        let list = WorkList::build(PathSet::new());
        assert!(list.is_empty());
        assert_eq!(list.position(Path::new("/anything")), None);
    }

    #[test]
    fn test_clone_shares_storage() {
        let list = work_list(&["/a", "/b"]);
        let copy = list.clone();
        assert!(std::ptr::eq(list.as_slice(), copy.as_slice()));
    }
}
