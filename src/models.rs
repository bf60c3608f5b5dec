//! Core data models for the rescan engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::PathBuf;

use crate::progress::ScanPhase;

/// Modification time of a file as Unix seconds (0 when unavailable)
pub fn unix_mtime(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video files (mp4, mkv, avi, etc.)
    Video,
    /// Image files (jpg, png, webp, etc.)
    Image,
    /// Audio files (mp3, flac, wav, etc.)
    Audio,
    /// Directories are indexed too
    Directory,
    /// Unknown or unsupported media type
    Unknown,
}

impl MediaType {
    /// Infer media type from file extension
    pub fn from_extension(ext: &str) -> Self {
        let ext_lower = ext.to_lowercase();
        match ext_lower.as_str() {
            // Video extensions
            "mp4" | "mkv" | "avi" | "wmv" | "flv" | "mov" | "webm" | "m4v" | "ts" | "rmvb"
            | "3gp" => MediaType::Video,
            // Image extensions
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tiff" | "tif" | "heic" => {
                MediaType::Image
            }
            // Audio extensions
            "mp3" | "flac" | "wav" | "aac" | "ogg" | "wma" | "m4a" | "opus" => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Directory => "directory",
            MediaType::Unknown => "unknown",
        }
    }

    /// Parse the string representation stored in the index
    pub fn parse(value: &str) -> Self {
        match value {
            "video" => MediaType::Video,
            "image" => MediaType::Image,
            "audio" => MediaType::Audio,
            "directory" => MediaType::Directory,
            _ => MediaType::Unknown,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the persisted media index as written by the indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes (0 for directories)
    pub size: u64,
    /// Modification time as Unix timestamp
    pub mtime: i64,
    /// Inferred media type
    pub media_type: MediaType,
    /// File hash (MD5 or partial hash)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Whether the hash is a partial hash (for large files)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_partial_hash: bool,
    /// When the record was written, Unix seconds
    pub indexed_at: i64,
}

impl IndexRecord {
    /// Create a new record with basic metadata
    pub fn new(path: PathBuf, size: u64, mtime: i64, media_type: MediaType) -> Self {
        Self {
            path,
            size,
            mtime,
            media_type,
            hash: None,
            is_partial_hash: false,
            indexed_at: Utc::now().timestamp(),
        }
    }

    /// Set the file hash
    pub fn with_hash(mut self, hash: String, is_partial: bool) -> Self {
        self.hash = Some(hash);
        self.is_partial_hash = is_partial;
        self
    }
}

/// Terminal result of a scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanOutcome {
    /// Every work list path was confirmed (or there was nothing to do)
    Success { items: usize },
    /// The scan never started
    Error { message: String },
    /// The session was torn down by its owner
    Cancelled,
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success { .. })
    }
}

/// Summary of a finished scan session
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Session identifier
    pub session: u64,
    /// Canonical scan root, if it resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Phase the session ended in
    pub phase: ScanPhase,
    /// Terminal outcome, if reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ScanOutcome>,
    /// Number of paths dispatched for indexing
    pub work_items: usize,
    /// Number of work list paths confirmed processed
    pub confirmed: usize,
    /// Number of diagnostic lines in the session log
    pub diagnostics: usize,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// When the summary was taken
    pub finished_at: DateTime<Utc>,
}

impl ScanSummary {
    /// Check if the scan reached a successful terminal state
    pub fn is_success(&self) -> bool {
        self.outcome.as_ref().is_some_and(ScanOutcome::is_success)
    }
}
