//! Disposable on-disk cache of pipeline results.
//!
//! Entries are keyed by the MD5 of the input paths concatenated in the order
//! given, so the same files named in a different order miss. File contents
//! and modification times play no part in the key: an edited file under an
//! unchanged path keeps returning the old result until the entry is removed
//! by hand.
//!
//! Every failure here is reported to the caller as a [`CacheError`] and
//! treated by the pipeline as "no cache".

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use md5::{Digest, Md5};
use tempfile::NamedTempFile;

use crate::error::CacheError;
use crate::NormalizedTable;

const CACHE_DIR_NAME: &str = "stravavis";
const CACHE_PREFIX: &str = "cached_activities_";
const CACHE_EXTENSION: &str = "json";

/// `<system temp dir>/stravavis`
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join(CACHE_DIR_NAME)
}

/// Lowercase hex MD5 of the paths joined with no separator.
///
/// # Example
///
/// ```rust
/// use stravavis_ingest::cache_key;
///
/// let forward = cache_key(&["a.gpx", "b.fit"]);
/// let reverse = cache_key(&["b.fit", "a.gpx"]);
/// assert_ne!(forward, reverse);
/// assert_eq!(forward, cache_key(&["a.gpx", "b.fit"]));
/// ```
pub fn cache_key<S: AsRef<str>>(files: &[S]) -> String {
    let mut hasher = Md5::new();
    for file in files {
        hasher.update(file.as_ref().as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Cache entries stored in one directory.
#[derive(Debug, Clone)]
pub struct ActivityCache {
    dir: PathBuf,
}

impl ActivityCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for this file list.
    pub fn entry_path<S: AsRef<str>>(&self, files: &[S]) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", CACHE_PREFIX, cache_key(files), CACHE_EXTENSION))
    }

    /// Load a previously stored table.
    ///
    /// A missing entry is `Ok(None)`; only an unreadable or corrupt entry is
    /// an error.
    pub fn lookup<S: AsRef<str>>(&self, files: &[S]) -> Result<Option<NormalizedTable>, CacheError> {
        self.ensure_dir()?;
        let path = self.entry_path(files);
        debug!("[cache] Cache filename: {}", path.display());

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("[cache] Cache not found");
                return Ok(None);
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let table: NormalizedTable = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;

        info!("[cache] Loaded {} cached rows from {}", table.len(), path.display());
        Ok(Some(table))
    }

    /// Store a table unless an entry for this file list already exists.
    ///
    /// The table is written to a temporary file first and then moved into
    /// place without overwriting, so readers never see a partial entry and a
    /// concurrent writer that got there first wins. Returns whether this call
    /// wrote the entry.
    pub fn store<S: AsRef<str>>(&self, files: &[S], table: &NormalizedTable) -> Result<bool, CacheError> {
        self.ensure_dir()?;
        let path = self.entry_path(files);

        if path.exists() {
            debug!("[cache] Entry {} already present", path.display());
            return Ok(false);
        }

        let io_err = |source: std::io::Error| CacheError::Io {
            path: path.clone(),
            source,
        };

        let tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, table).map_err(|e| io_err(e.into()))?;
            writer.flush().map_err(io_err)?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                info!("[cache] Saved {} rows to {}", table.len(), path.display());
                Ok(true)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("[cache] Lost write race for {}, keeping existing entry", path.display());
                Ok(false)
            }
            Err(e) => Err(io_err(e.error)),
        }
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })
    }
}
