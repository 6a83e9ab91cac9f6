use std::collections::HashMap;
use std::io;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{normalize_path, FileInfo, VirtualFiles};
use crate::error::TemplateResult;

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    last_modified: SystemTime,
}

/// An in-memory file store.
///
/// Writes through a shared reference, so one instance can be handed to a
/// context and still be updated by the test or host that owns it.
///
/// ```rust
/// use pagewright::vfs::MemoryVirtualFiles;
///
/// let files = MemoryVirtualFiles::new();
/// files.write_file("/posts/hello.html", "<p>hi</p>");
/// assert_eq!(files.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryVirtualFiles {
    files: RwLock<HashMap<String, MemoryFile>>,
}

impl MemoryVirtualFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file, stamping it with the current time.
    ///
    /// A rewrite always moves the timestamp forward, even when the clock has
    /// not advanced since the previous write.
    pub fn write_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let path = normalize_path(path);
        let mut files = self.files.write();
        let mut now = SystemTime::now();
        if let Some(existing) = files.get(&path) {
            if existing.last_modified >= now {
                now = existing.last_modified + Duration::from_millis(1);
            }
        }
        files.insert(
            path,
            MemoryFile {
                contents: contents.into(),
                last_modified: now,
            },
        );
    }

    /// Creates or replaces a file with an explicit modification time.
    pub fn write_file_at(&self, path: &str, contents: impl Into<Vec<u8>>, modified: SystemTime) {
        self.files.write().insert(
            normalize_path(path),
            MemoryFile {
                contents: contents.into(),
                last_modified: modified,
            },
        );
    }

    /// Removes a file, returning `true` if it existed.
    pub fn remove_file(&self, path: &str) -> bool {
        self.files.write().remove(&normalize_path(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl VirtualFiles for MemoryVirtualFiles {
    async fn file_info(&self, path: &str) -> TemplateResult<Option<FileInfo>> {
        let path = normalize_path(path);
        Ok(self.files.read().get(&path).map(|file| FileInfo {
            virtual_path: path.clone(),
            last_modified: file.last_modified,
        }))
    }

    async fn read_all(&self, path: &str) -> TemplateResult<Vec<u8>> {
        let path = normalize_path(path);
        match self.files.read().get(&path) {
            Some(file) => Ok(file.contents.clone()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path)).into()),
        }
    }
}
