//! Template sources: where raw template bytes come from.
//!
//! The cache only needs two things from a source: the current bytes and a
//! modification time to check staleness against. Files are the normal case;
//! the in-memory source exists for embedding and for tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::debug;

/// A readable template with a modification time.
pub trait TemplateSource: Send + Sync {
    fn read(&self) -> io::Result<Vec<u8>>;

    /// Modification time of the current content. Advances whenever the
    /// content changes; the cache compares it against its last-load time.
    fn last_modified(&self) -> io::Result<SystemTime>;

    /// Human-readable identity, used in log messages.
    fn describe(&self) -> String;
}

/// A template backed by a file on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemplateSource for FileSource {
    fn read(&self) -> io::Result<Vec<u8>> {
        debug!(path = %self.path.display(), "reading template source");
        fs::read(&self.path)
    }

    fn last_modified(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

struct MemoryState {
    content: Vec<u8>,
    modified: SystemTime,
}

/// A template held in memory. `set_content` always advances the
/// modification time, even when the wall clock has not ticked, so a
/// replacement is never mistaken for the version already cached.
pub struct MemorySource {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState {
                content: content.into(),
                modified: SystemTime::now(),
            }),
        }
    }

    pub fn set_content(&self, content: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = SystemTime::now();
        let bumped = state.modified + Duration::from_secs(1);
        state.modified = if now > bumped { now } else { bumped };
        state.content = content.into();
    }
}

impl TemplateSource for MemorySource {
    fn read(&self) -> io::Result<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.content.clone())
    }

    fn last_modified(&self) -> io::Result<SystemTime> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.modified)
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_round_trip() {
        let src = MemorySource::new("t1", b"<html></html>".to_vec());
        assert_eq!(src.read().unwrap(), b"<html></html>");
        assert_eq!(src.describe(), "memory:t1");
    }

    #[test]
    fn test_set_content_advances_modification_time() {
        let src = MemorySource::new("t2", b"v1".to_vec());
        let before = src.last_modified().unwrap();
        src.set_content(b"v2".to_vec());
        let after = src.last_modified().unwrap();
        assert!(after > before);
        assert_eq!(src.read().unwrap(), b"v2");
    }

    #[test]
    fn test_file_source_reads_and_stats() {
        let path = std::env::temp_dir().join(format!(
            "yeast-source-test-{}.html",
            std::process::id()
        ));
        fs::write(&path, b"<html><body></body></html>").unwrap();
        let src = FileSource::new(&path);
        assert_eq!(src.read().unwrap(), b"<html><body></body></html>");
        assert!(src.last_modified().is_ok());
        assert_eq!(src.describe(), path.display().to_string());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let src = FileSource::new("/nonexistent/surely/missing.html");
        assert!(src.read().is_err());
        assert!(src.last_modified().is_err());
    }
}
