//! Configuration for the rescan engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScanError;

/// Default name of the file that blocks enumeration of a directory
pub const DEFAULT_EXCLUSION_MARKER: &str = ".nomedia";

/// Default number of attempts for the bulk index read
pub const DEFAULT_INDEX_RETRIES: u32 = 3;

/// Default delay between index read attempts (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default target interval between reconciliation progress updates (milliseconds)
pub const DEFAULT_REPORT_TARGET_MS: u64 = 25;

/// Default large file threshold (100 MB)
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default batch size for database writes
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default minimum interval between JSON progress lines (milliseconds)
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 200;

/// Configuration for the rescan engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root directory to rescan
    pub root: Option<PathBuf>,

    /// File name that blocks enumeration of the directory containing it
    pub exclusion_marker: String,

    /// Canonical paths that alias the whole storage or system root.
    /// The walker never enters them.
    pub alias_roots: Vec<PathBuf>,

    /// Child names whose presence suggests a directory aliases the storage root.
    /// Only logged, never skipped.
    pub alias_hints: Vec<String>,

    /// Number of attempts for the bulk index read
    pub index_retries: u32,

    /// Delay between index read attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Target interval between reconciliation progress updates (milliseconds)
    pub report_target_ms: u64,

    /// Database path of the persisted media index
    pub db_path: Option<PathBuf>,

    /// Number of indexer threads
    /// 0 means auto-detect (CPU cores × 2)
    pub num_threads: usize,

    /// Whether the indexer computes file hashes
    pub compute_hash: bool,

    /// Threshold for using partial hash (bytes)
    /// Files larger than this use partial hash (first 1MB + last 1MB)
    pub large_file_threshold: u64,

    /// Batch size for database writes
    pub batch_size: usize,

    /// Append the full work list to the diagnostic log before dispatch
    pub log_work_list: bool,

    /// Minimum interval between JSON progress lines (milliseconds)
    pub progress_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: None,
            exclusion_marker: DEFAULT_EXCLUSION_MARKER.to_string(),
            alias_roots: Self::default_alias_roots(),
            alias_hints: vec!["emulated".to_string()],
            index_retries: DEFAULT_INDEX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            report_target_ms: DEFAULT_REPORT_TARGET_MS,
            db_path: None,
            num_threads: 0,
            compute_hash: true,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            log_work_list: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScanError::from(e).with_path(path.to_path_buf())
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ScanError::io_error(Some(path.to_path_buf()), format!("Invalid config: {}", e))
        })
    }

    /// Alias roots known to be dangerous on the current platform
    pub fn default_alias_roots() -> Vec<PathBuf> {
        if cfg!(target_os = "android") {
            vec![PathBuf::from("/storage"), PathBuf::from("/system")]
        } else {
            Vec::new()
        }
    }

    /// Delay between index read attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Target interval between reconciliation progress updates
    pub fn report_target(&self) -> Duration {
        Duration::from_millis(self.report_target_ms)
    }

    /// Get the effective number of threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            // Auto-detect: CPU cores × 2
            std::thread::available_parallelism()
                .map(|p| p.get() * 2)
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }

    /// Get the effective batch size (never zero)
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn from_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Set the root directory
    pub fn root(mut self, root: PathBuf) -> Self {
        self.config.root = Some(root);
        self
    }

    /// Set the exclusion marker file name
    pub fn exclusion_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.exclusion_marker = marker.into();
        self
    }

    /// Set the alias roots
    pub fn alias_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.alias_roots = roots;
        self
    }

    /// Add an alias root
    pub fn add_alias_root(mut self, root: PathBuf) -> Self {
        self.config.alias_roots.push(root);
        self
    }

    /// Set the alias hint names
    pub fn alias_hints(mut self, hints: Vec<String>) -> Self {
        self.config.alias_hints = hints;
        self
    }

    /// Set the number of index read attempts
    pub fn index_retries(mut self, retries: u32) -> Self {
        self.config.index_retries = retries;
        self
    }

    /// Set the delay between index read attempts
    pub fn retry_delay_ms(mut self, delay: u64) -> Self {
        self.config.retry_delay_ms = delay;
        self
    }

    /// Set the target interval between reconciliation progress updates
    pub fn report_target_ms(mut self, target: u64) -> Self {
        self.config.report_target_ms = target;
        self
    }

    /// Set the database path
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Enable or disable hash computation
    pub fn compute_hash(mut self, enabled: bool) -> Self {
        self.config.compute_hash = enabled;
        self
    }

    /// Set the large file threshold
    pub fn large_file_threshold(mut self, threshold: u64) -> Self {
        self.config.large_file_threshold = threshold;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Enable or disable logging of the work list
    pub fn log_work_list(mut self, enabled: bool) -> Self {
        self.config.log_work_list = enabled;
        self
    }

    /// Set the minimum interval between JSON progress lines
    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert!(config.root.is_none());
        assert_eq!(config.exclusion_marker, ".nomedia");
        assert_eq!(config.index_retries, DEFAULT_INDEX_RETRIES);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.report_target(), Duration::from_millis(25));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.compute_hash);
    }

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root(PathBuf::from("/sdcard"))
            .exclusion_marker(".skip")
            .add_alias_root(PathBuf::from("/system"))
            .index_retries(5)
            .num_threads(4)
            .batch_size(0)
            .compute_hash(false)
            .build();

        assert_eq!(config.root, Some(PathBuf::from("/sdcard")));
        assert_eq!(config.exclusion_marker, ".skip");
        assert!(config.alias_roots.contains(&PathBuf::from("/system")));
        assert_eq!(config.index_retries, 5);
        assert_eq!(config.effective_threads(), 4);
        assert_eq!(config.effective_batch_size(), 1);
        assert!(!config.compute_hash);
    }

    #[test]
    fn test_effective_threads() {
        let auto_config = ScanConfig::default();
        assert!(auto_config.effective_threads() > 0);
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rescan.json");
        std::fs::write(
            &file,
            r#"{ "root": "/media", "exclusion_marker": ".ignore", "index_retries": 1 }"#,
        )
        .unwrap();

        let config = ScanConfig::load(&file).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/media")));
        assert_eq!(config.exclusion_marker, ".ignore");
        assert_eq!(config.index_retries, 1);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        std::fs::write(&file, "{ not json").unwrap();
        assert!(ScanConfig::load(&file).is_err());
        assert!(ScanConfig::load(&dir.path().join("absent.json")).is_err());
    }
}
