//! Indexing service - the consumer of dispatched work lists

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::ScanConfig;
use crate::coordinator::CompletionSink;
use crate::db::ScanDatabase;
use crate::error::ScanError;
use crate::models::{unix_mtime, IndexRecord, MediaType};
use crate::worklist::WorkList;

/// Size of the head and tail chunks hashed for large files
const PARTIAL_HASH_CHUNK: usize = 1024 * 1024;

/// Receives work lists from the coordinator.
///
/// `dispatch` is fire-and-forget: it must hand the work off and return.
/// Each path is later reported through the sink, in any order, from any
/// thread.
pub trait IndexingService {
    fn dispatch(&self, work_list: WorkList, sink: CompletionSink);
}

/// Indexer that hashes files on a rayon pool and writes the SQLite index
pub struct LocalIndexer {
    pool: rayon::ThreadPool,
    job: IndexJob,
}

impl LocalIndexer {
    pub fn new(config: &ScanConfig, db_path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_threads())
            .thread_name(|i| format!("indexer-{}", i))
            .build()
            .map_err(|e| ScanError::io_error(None, format!("Cannot build indexer pool: {}", e)))?;

        Ok(Self {
            pool,
            job: IndexJob {
                db_path: db_path.into(),
                compute_hash: config.compute_hash,
                large_file_threshold: config.large_file_threshold,
                batch_size: config.effective_batch_size(),
            },
        })
    }
}

impl IndexingService for LocalIndexer {
    fn dispatch(&self, work_list: WorkList, sink: CompletionSink) {
        log::info!(
            "Indexing {} path(s) into {}",
            work_list.len(),
            self.job.db_path.display()
        );
        let job = self.job.clone();
        self.pool.spawn(move || job.run(&work_list, &sink));
    }
}

#[derive(Debug, Clone)]
struct IndexJob {
    db_path: PathBuf,
    compute_hash: bool,
    large_file_threshold: u64,
    batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum IndexAction {
    Upsert(IndexRecord),
    Remove(PathBuf),
}

impl IndexAction {
    fn path(&self) -> &Path {
        match self {
            IndexAction::Upsert(record) => &record.path,
            IndexAction::Remove(path) => path,
        }
    }
}

impl IndexJob {
    fn run(&self, work_list: &WorkList, sink: &CompletionSink) {
        let mut db = match ScanDatabase::open(&self.db_path) {
            Ok(db) => Some(db),
            Err(e) => {
                log::error!("Cannot open index {}: {}", self.db_path.display(), e);
                None
            }
        };

        for chunk in work_list.as_slice().chunks(self.batch_size) {
            let actions: Vec<IndexAction> = chunk
                .par_iter()
                .map(|path| self.index_path(path.as_path()))
                .collect();

            if let Some(db) = db.as_mut() {
                if let Err(e) = apply(db, &actions) {
                    log::error!("Failed to update index: {}", e);
                }
            }

            // Paths count as processed even when the write failed
            for action in &actions {
                sink.complete(action.path());
            }
        }
    }

    fn index_path(&self, path: &Path) -> IndexAction {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return IndexAction::Remove(path.to_path_buf()),
        };
        let mtime = unix_mtime(&metadata);

        if metadata.is_dir() {
            return IndexAction::Upsert(IndexRecord::new(
                path.to_path_buf(),
                0,
                mtime,
                MediaType::Directory,
            ));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let mut record = IndexRecord::new(
            path.to_path_buf(),
            metadata.len(),
            mtime,
            MediaType::from_extension(&extension),
        );

        if self.compute_hash && record.media_type != MediaType::Unknown {
            match compute_file_hash(path, self.large_file_threshold) {
                Ok((hash, partial)) => record = record.with_hash(hash, partial),
                Err(e) => log::warn!("{}", e),
            }
        }

        IndexAction::Upsert(record)
    }
}

fn apply(db: &mut ScanDatabase, actions: &[IndexAction]) -> Result<(), ScanError> {
    let mut records = Vec::new();
    let mut removed = Vec::new();
    for action in actions {
        match action {
            IndexAction::Upsert(record) => records.push(record.clone()),
            IndexAction::Remove(path) => removed.push(path.clone()),
        }
    }

    db.upsert_records(&records)?;
    db.remove_paths(&removed)?;
    Ok(())
}

/// MD5 of the file; above `large_file_threshold` only the first and last
/// megabyte are hashed and the result is flagged partial
pub fn compute_file_hash(path: &Path, large_file_threshold: u64) -> Result<(String, bool), ScanError> {
    use md5::{Digest, Md5};
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    let hash_err = |e: std::io::Error| ScanError::hash_error(path.to_path_buf(), e.to_string());

    let mut file = File::open(path).map_err(hash_err)?;
    let file_size = file.metadata().map_err(hash_err)?.len();
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; PARTIAL_HASH_CHUNK];

    if file_size <= large_file_threshold {
        loop {
            let n = file.read(&mut buffer).map_err(hash_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        return Ok((format!("{:x}", hasher.finalize()), false));
    }

    // Head and tail chunks are read in full; a short read would change the hash
    buffer.clear();
    (&mut file)
        .take(PARTIAL_HASH_CHUNK as u64)
        .read_to_end(&mut buffer)
        .map_err(hash_err)?;
    hasher.update(&buffer);

    if file_size > PARTIAL_HASH_CHUNK as u64 {
        file.seek(SeekFrom::End(-(PARTIAL_HASH_CHUNK as i64)))
            .map_err(hash_err)?;
        buffer.clear();
        (&mut file)
            .take(PARTIAL_HASH_CHUNK as u64)
            .read_to_end(&mut buffer)
            .map_err(hash_err)?;
        hasher.update(&buffer);
    }

    Ok((format!("{:x}", hasher.finalize()), true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(compute_hash: bool) -> IndexJob {
        IndexJob {
            db_path: PathBuf::from("unused.db"),
            compute_hash,
            large_file_threshold: 1024,
            batch_size: 10,
        }
    }

    #[test]
    fn test_full_hash_of_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"").unwrap();

        let (hash, partial) = compute_file_hash(&path, 1024).unwrap();
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(!partial);
    }

    #[test]
    fn test_partial_hash_above_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        std::fs::write(&path, vec![7u8; 3 * PARTIAL_HASH_CHUNK]).unwrap();

        let (partial_hash, partial) = compute_file_hash(&path, 1024).unwrap();
        let (full_hash, full_partial) = compute_file_hash(&path, u64::MAX).unwrap();
        assert!(partial);
        assert!(!full_partial);
        assert_ne!(partial_hash, full_hash);
    }

    #[test]
    fn test_partial_hash_covers_whole_head_and_tail() {
        use md5::{Digest, Md5};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let content: Vec<u8> = (0..(3 * PARTIAL_HASH_CHUNK + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let mut expected = Md5::new();
        expected.update(&content[..PARTIAL_HASH_CHUNK]);
        expected.update(&content[content.len() - PARTIAL_HASH_CHUNK..]);
        let expected = format!("{:x}", expected.finalize());

        let (hash, partial) = compute_file_hash(&path, 1024).unwrap();
        assert!(partial);
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_hash_of_missing_file_is_hash_error() {
        let err = compute_file_hash(Path::new("/nonexistent/x.jpg"), 1024).unwrap_err();
        assert_eq!(err.kind, crate::error::ScanErrorKind::HashError);
    }

    #[test]
    fn test_index_path_actions() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.JPG");
        std::fs::write(&image, b"abc").unwrap();

        match job(true).index_path(&image) {
            IndexAction::Upsert(record) => {
                assert_eq!(record.media_type, MediaType::Image);
                assert_eq!(record.size, 3);
                assert_eq!(record.hash.as_deref(), Some("900150983cd24fb0d6963f7d28e17f72"));
            }
            other => panic!("unexpected action {:?}", other),
        }

        match job(false).index_path(dir.path()) {
            IndexAction::Upsert(record) => {
                assert_eq!(record.media_type, MediaType::Directory);
                assert!(record.hash.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }

        let gone = dir.path().join("gone.jpg");
        assert_eq!(job(true).index_path(&gone), IndexAction::Remove(gone.clone()));
    }

    #[test]
    fn test_apply_writes_and_removes() {
        let mut db = ScanDatabase::open_memory().unwrap();
        db.upsert_records(&[IndexRecord::new(
            PathBuf::from("/m/old.jpg"),
            1,
            1,
            MediaType::Image,
        )])
        .unwrap();

        apply(
            &mut db,
            &[
                IndexAction::Upsert(IndexRecord::new(
                    PathBuf::from("/m/new.jpg"),
                    2,
                    2,
                    MediaType::Image,
                )),
                IndexAction::Remove(PathBuf::from("/m/old.jpg")),
            ],
        )
        .unwrap();

        assert!(db.get_record(Path::new("/m/old.jpg")).unwrap().is_none());
        assert!(db.get_record(Path::new("/m/new.jpg")).unwrap().is_some());
    }
}
