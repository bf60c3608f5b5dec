//! Tree walker - enumerates a storage root into an ordered path set
//!
//! The walk is depth-first and pre-order. Every node is canonicalized before
//! it is visited, so symlink loops end as soon as a resolved path repeats.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanErrorKind};
use crate::path_set::{CanonicalPath, PathSet};

/// Non-fatal event recorded during a walk
#[derive(Debug, Clone)]
pub enum WalkDiagnostic {
    /// A configured alias root was reached and skipped
    AliasRootSkipped(CanonicalPath),
    /// A directory or entry could not be read
    Unreadable(ScanError),
}

impl fmt::Display for WalkDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkDiagnostic::AliasRootSkipped(path) => {
                write!(f, "Skipping alias root {}", path)
            }
            WalkDiagnostic::Unreadable(err) => match &err.path {
                Some(path) => write!(f, "Skipping folder {}: {}", path.display(), err.message),
                None => write!(f, "Skipping folder: {}", err.message),
            },
        }
    }
}

/// Result of a walk
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Every canonical path reached, directories included
    pub candidates: PathSet,
    /// Non-fatal diagnostics in the order they happened
    pub diagnostics: Vec<WalkDiagnostic>,
    /// Directories whose children were not enumerated because of the marker
    pub excluded_dirs: u64,
    /// Whether the walk stopped early on cancellation
    pub cancelled: bool,
}

/// Recursive walker honoring exclusion markers and alias roots
#[derive(Debug, Clone)]
pub struct TreeWalker {
    exclusion_marker: String,
    alias_roots: Vec<PathBuf>,
    alias_hints: Vec<String>,
}

impl TreeWalker {
    /// Create a walker from the scan configuration
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            exclusion_marker: config.exclusion_marker.clone(),
            alias_roots: config.alias_roots.clone(),
            alias_hints: config.alias_hints.clone(),
        }
    }

    /// Walk `root` to completion
    pub fn walk(&self, root: &Path) -> Result<WalkOutcome, ScanError> {
        self.walk_until(root, &AtomicBool::new(false))
    }

    /// Walk `root`, stopping early once `cancel` is set
    pub fn walk_until(&self, root: &Path, cancel: &AtomicBool) -> Result<WalkOutcome, ScanError> {
        let root = CanonicalPath::resolve(root).map_err(|e| {
            ScanError::new(ScanErrorKind::PathResolution, e.path, e.message)
        })?;

        let mut outcome = WalkOutcome::default();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }

            // Already visited through another route (symlink loop or alias)
            if outcome.candidates.contains(&node) {
                continue;
            }

            if self.is_alias_root(&node) {
                log::warn!("Skipping scan of alias root {}", node);
                outcome
                    .diagnostics
                    .push(WalkDiagnostic::AliasRootSkipped(node));
                continue;
            }

            outcome.candidates.insert(node.clone());

            let is_dir = match std::fs::metadata(node.as_path()) {
                Ok(metadata) => metadata.is_dir(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Path vanished during walk: {}", node);
                    continue;
                }
                Err(e) => {
                    outcome.diagnostics.push(WalkDiagnostic::Unreadable(
                        ScanError::from(e).with_path(node.clone().into_path_buf()),
                    ));
                    continue;
                }
            };
            if !is_dir {
                continue;
            }

            self.check_alias_hints(&node);

            if self.has_exclusion_marker(&node) {
                log::debug!("Not descending into {}: contains {}", node, self.exclusion_marker);
                outcome.excluded_dirs += 1;
                continue;
            }

            let children = self.list_children(&node, &mut outcome.diagnostics);
            // Reversed so the first child is popped first
            stack.extend(children.into_iter().rev());
        }

        log::debug!(
            "Walk finished: {} paths, {} excluded dirs, {} diagnostics",
            outcome.candidates.len(),
            outcome.excluded_dirs,
            outcome.diagnostics.len()
        );

        Ok(outcome)
    }

    fn is_alias_root(&self, path: &CanonicalPath) -> bool {
        self.alias_roots.iter().any(|alias| alias.as_path() == path.as_path())
    }

    fn has_exclusion_marker(&self, dir: &CanonicalPath) -> bool {
        !self.exclusion_marker.is_empty() && dir.join(&self.exclusion_marker).exists()
    }

    fn check_alias_hints(&self, dir: &CanonicalPath) {
        for hint in &self.alias_hints {
            if !hint.is_empty() && dir.join(hint).exists() {
                log::warn!(
                    "Path {} contains '{}' and might alias the storage root",
                    dir,
                    hint
                );
            }
        }
    }

    /// List the direct children of `dir`, canonicalized, in file name order
    fn list_children(
        &self,
        dir: &CanonicalPath,
        diagnostics: &mut Vec<WalkDiagnostic>,
    ) -> Vec<CanonicalPath> {
        let mut children = Vec::new();

        let entries = WalkDir::new(dir.as_path())
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in entries {
            match entry {
                Ok(entry) => match CanonicalPath::resolve(entry.path()) {
                    Ok(child) => children.push(child),
                    Err(e) if e.kind == ScanErrorKind::NotFound => {
                        log::debug!("Skipping vanished entry {:?}", entry.path());
                    }
                    Err(e) => diagnostics.push(WalkDiagnostic::Unreadable(e)),
                },
                Err(e) => {
                    let err = ScanError::from(e);
                    log::warn!("Cannot list {}: {}", dir, err.message);
                    diagnostics.push(WalkDiagnostic::Unreadable(err));
                }
            }
        }

        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn walker() -> TreeWalker {
        TreeWalker::new(&ScanConfig::builder().alias_roots(Vec::new()).build())
    }

    fn canonical(path: &Path) -> CanonicalPath {
        CanonicalPath::resolve(path).unwrap()
    }

    #[test]
    fn test_walk_records_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("music/album")).unwrap();
        fs::write(dir.path().join("music/album/song.mp3"), b"x").unwrap();
        fs::write(dir.path().join("photo.jpg"), b"x").unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        let root = canonical(dir.path());
        let paths: Vec<_> = outcome.candidates.iter().cloned().collect();

        assert_eq!(
            paths,
            vec![
                root.clone(),
                canonical(&dir.path().join("music")),
                canonical(&dir.path().join("music/album")),
                canonical(&dir.path().join("music/album/song.mp3")),
                canonical(&dir.path().join("photo.jpg")),
            ]
        );
        assert!(outcome.diagnostics.is_empty());
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_exclusion_marker_blocks_descent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/deeper")).unwrap();
        fs::write(dir.path().join("b/.nomedia"), b"").unwrap();
        fs::write(dir.path().join("b/c.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b/deeper/d.jpg"), b"x").unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        let b = canonical(&dir.path().join("b"));

        assert!(outcome.candidates.contains(&b));
        assert_eq!(outcome.excluded_dirs, 1);
        for path in &outcome.candidates {
            assert!(!path.starts_with(b.as_path()) || *path == b);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_self_symlink_walk() {
        // root: a.jpg, b/.nomedia, b/c.jpg, d -> .
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/.nomedia"), b"").unwrap();
        fs::write(dir.path().join("b/c.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(".", dir.path().join("d")).unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        let root = canonical(dir.path());
        let paths: Vec<_> = outcome.candidates.iter().cloned().collect();

        // d resolves to the root, which is already present
        assert_eq!(
            paths,
            vec![
                root.clone(),
                CanonicalPath::assume_canonical(root.join("a.jpg")),
                CanonicalPath::assume_canonical(root.join("b")),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates_with_unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x/y")).unwrap();
        fs::write(dir.path().join("x/y/z.png"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("x"), dir.path().join("x/y/back")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("x/y"), dir.path().join("side")).unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        let collected: Vec<_> = outcome.candidates.iter().collect();
        let mut deduped = collected.clone();
        deduped.dedup();

        assert_eq!(collected.len(), deduped.len());
        assert_eq!(outcome.candidates.len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_outside_tree_is_followed() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("ext.ogg"), b"x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("mount")).unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        assert!(outcome
            .candidates
            .contains(&canonical(&outside.path().join("ext.ogg"))));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("dangling")).unwrap();

        let outcome = walker().walk(dir.path()).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert!(outcome.diagnostics.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_directory_is_reported_and_walk_continues() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inside.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("open")).unwrap();
        fs::write(dir.path().join("open/x.jpg"), b"x").unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores directory permissions
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let outcome = walker().walk(dir.path()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let root = canonical(dir.path());
        assert!(outcome
            .candidates
            .contains(&CanonicalPath::assume_canonical(root.join("locked"))));
        assert!(!outcome
            .candidates
            .contains(&CanonicalPath::assume_canonical(root.join("locked/inside.jpg"))));
        assert!(outcome
            .candidates
            .contains(&CanonicalPath::assume_canonical(root.join("open/x.jpg"))));

        let skipped: Vec<String> = outcome
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .filter(|line| line.starts_with("Skipping folder"))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            &outcome.diagnostics[0],
            WalkDiagnostic::Unreadable(err) if err.kind == ScanErrorKind::PermissionDenied
        ));
    }

    #[test]
    fn test_alias_root_is_skipped_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("storage/inner")).unwrap();
        fs::write(dir.path().join("keep.jpg"), b"x").unwrap();
        let alias = canonical(&dir.path().join("storage"));

        let config = ScanConfig::builder()
            .alias_roots(vec![alias.clone().into_path_buf()])
            .build();
        let outcome = TreeWalker::new(&config).walk(dir.path()).unwrap();

        assert!(!outcome.candidates.contains(&alias));
        assert_eq!(outcome.candidates.len(), 2);
        assert!(matches!(
            &outcome.diagnostics[..],
            [WalkDiagnostic::AliasRootSkipped(p)] if *p == alias
        ));
        assert!(outcome.diagnostics[0].to_string().contains("alias root"));
    }

    #[test]
    fn test_root_file_yields_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("single.mp4");
        fs::write(&file, b"x").unwrap();

        let outcome = walker().walk(&file).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[test]
    fn test_missing_root_is_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = walker().walk(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::PathResolution);
    }

    #[test]
    fn test_cancelled_walk_stops() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();

        let outcome = walker()
            .walk_until(dir.path(), &AtomicBool::new(true))
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.candidates.is_empty());
    }
}
