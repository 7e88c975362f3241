//! Implement the on-disk cache of command transcripts.
//!
//! Each cache key maps to one plain text file in the cache directory holding
//! the full transcript of the last successful run. There is no expiry: an
//! entry is replaced only when a caller forces a refresh, or when the file is
//! deleted.
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Struct implementing a cache of command transcripts
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Create a cache stored in directory `dir`.
    ///
    /// The directory is not created, see [`crate::get_cache`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the file backing `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key).as_ref())
    }

    /// Return the cached transcript for `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.path(key);
        match fs::read(&path) {
            Ok(content) => {
                debug!("Cache hit for `{}` ({:?})", key, &path);
                Some(String::from_utf8_lossy(&content).into_owned())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Unable to read cache file {:?}: {}", &path, e);
                None
            }
        }
    }

    /// Persist `transcript` under `key`.
    ///
    /// Blank transcripts are not written so that a run which produced nothing
    /// is never replayed later as a valid result. Returns whether the entry
    /// was written.
    pub fn put(&self, key: &str, transcript: &str) -> Result<bool> {
        if transcript.trim().is_empty() {
            debug!("Not caching blank transcript for `{}`", key);
            return Ok(false);
        }
        let path = self.path(key);
        fs::write(&path, transcript)
            .with_context(|| format!("Writing to cache file {:?}", &path))?;
        debug!("Cached `{}` in {:?}", key, &path);
        Ok(true)
    }

    /// Last modification time of the entry for `key`.
    pub fn modified(&self, key: &str) -> Option<DateTime<Local>> {
        let modified = fs::metadata(self.path(key)).ok()?.modified().ok()?;
        Some(modified.into())
    }
}

/// Turn a cache key into a safe file name.
///
/// Bytes outside `[A-Za-z0-9._-]`, a leading `.` and `%` itself are escaped as
/// `%XX`. The mapping is injective, so two distinct keys never share a file.
pub fn file_name(key: &str) -> Cow<'_, str> {
    let safe = |(i, b): (usize, u8)| {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || (b == b'.' && i > 0)
    };
    if !key.is_empty() && key.bytes().enumerate().all(safe) {
        return Cow::Borrowed(key);
    }
    if key.is_empty() {
        return Cow::Borrowed("%");
    }
    let mut name = String::with_capacity(key.len() + 8);
    for (i, b) in key.bytes().enumerate() {
        if safe((i, b)) {
            name.push(b as char);
        } else {
            name.push_str(&format!("%{:02X}", b));
        }
    }
    Cow::Owned(name)
}
