//! Canonical paths and the ordered, duplicate-free set built from them
//!
//! Canonical paths compare by the raw bytes of their OS string, so the
//! set iterates in plain string order (`/a-c` sorts before `/a/b`).

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};

use crate::error::ScanError;

/// A symlink-free absolute path. Equality, hashing and ordering use the
/// path's bytes.
#[derive(Debug, Clone)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Resolve an existing path to its canonical form
    pub fn resolve(path: &Path) -> Result<Self, ScanError> {
        std::fs::canonicalize(path).map(Self).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ScanError::not_found(path.to_path_buf())
            } else {
                ScanError::path_resolution(path.to_path_buf(), e.to_string())
            }
        })
    }

    /// Resolve a path that may no longer exist.
    ///
    /// The deepest existing ancestor is canonicalized and the missing tail
    /// is appended lexically.
    pub fn resolve_lenient(path: &Path) -> Result<Self, ScanError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| ScanError::path_resolution(path.to_path_buf(), e.to_string()))?
                .join(path)
        };

        for ancestor in absolute.ancestors() {
            match std::fs::canonicalize(ancestor) {
                Ok(base) => {
                    let rest = absolute.strip_prefix(ancestor).unwrap_or(Path::new(""));
                    return Ok(Self(append_lexically(base, rest)));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ScanError::path_resolution(
                        path.to_path_buf(),
                        e.to_string(),
                    ))
                }
            }
        }

        Err(ScanError::path_resolution(
            path.to_path_buf(),
            "no existing ancestor",
        ))
    }

    /// Wrap a path that is already known to be canonical
    pub fn assume_canonical(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Get the underlying path
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consume into the underlying path
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Raw bytes used for ordering
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_os_str().as_encoded_bytes()
    }
}

fn append_lexically(mut base: PathBuf, rest: &Path) -> PathBuf {
    for component in rest.components() {
        match component {
            Component::Normal(name) => base.push(name),
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    base
}

impl PartialEq for CanonicalPath {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for CanonicalPath {}

impl Hash for CanonicalPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for CanonicalPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Deref for CanonicalPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for CanonicalPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string_lossy())
    }
}

/// Strictly ordered, duplicate-free set of canonical paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    paths: BTreeSet<CanonicalPath>,
}

impl PathSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path. Returns false if it was already present.
    pub fn insert(&mut self, path: CanonicalPath) -> bool {
        self.paths.insert(path)
    }

    /// Remove a path. Returns true if it was present.
    pub fn remove(&mut self, path: &CanonicalPath) -> bool {
        self.paths.remove(path)
    }

    pub fn contains(&self, path: &CanonicalPath) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate in ascending byte order
    pub fn iter(&self) -> btree_set::Iter<'_, CanonicalPath> {
        self.paths.iter()
    }

    /// Consume into an ascending vector
    pub fn into_sorted_vec(self) -> Vec<CanonicalPath> {
        self.paths.into_iter().collect()
    }
}

impl FromIterator<CanonicalPath> for PathSet {
    fn from_iter<I: IntoIterator<Item = CanonicalPath>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PathSet {
    type Item = &'a CanonicalPath;
    type IntoIter = btree_set::Iter<'a, CanonicalPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cp(path: &str) -> CanonicalPath {
        CanonicalPath::assume_canonical(path)
    }

    #[test]
    fn test_byte_ordering_differs_from_component_ordering() {
        // '-' (0x2d) sorts before '/' (0x2f)
        assert!(cp("/a-c") < cp("/a/b"));
        assert!(Path::new("/a/b") < Path::new("/a-c"));
    }

    #[test]
    fn test_set_rejects_duplicates() {
        let mut set = PathSet::new();
        assert!(set.insert(cp("/sdcard/a.jpg")));
        assert!(!set.insert(cp("/sdcard/a.jpg")));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&cp("/sdcard/a.jpg")));
        assert!(!set.remove(&cp("/sdcard/a.jpg")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_resolve_existing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"x").unwrap();

        let resolved = CanonicalPath::resolve(&dir.path().join(".").join("a.jpg")).unwrap();
        assert_eq!(resolved.as_path(), std::fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CanonicalPath::resolve(&dir.path().join("gone.jpg")).unwrap_err();
        assert_eq!(err.kind, crate::error::ScanErrorKind::NotFound);
    }

    #[test]
    fn test_resolve_lenient_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();

        let resolved =
            CanonicalPath::resolve_lenient(&dir.path().join("gone/../also-gone/x.jpg")).unwrap();
        assert_eq!(resolved.as_path(), base.join("also-gone/x.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_lenient_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let resolved = CanonicalPath::resolve_lenient(&dir.path().join("link/missing.mp3")).unwrap();
        assert_eq!(resolved.as_path(), base.join("real/missing.mp3"));
    }

    proptest! {
        #[test]
        fn prop_iteration_is_strictly_ascending(names in proptest::collection::vec("[a-z/.-]{1,12}", 0..40)) {
            let set: PathSet = names.iter().map(|n| cp(&format!("/{}", n))).collect();
            let sorted = set.clone().into_sorted_vec();
            for pair in sorted.windows(2) {
                prop_assert!(pair[0].as_bytes() < pair[1].as_bytes());
            }
            prop_assert_eq!(sorted.len(), set.len());
        }
    }
}
