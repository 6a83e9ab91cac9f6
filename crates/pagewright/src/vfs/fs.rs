use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{normalize_path, FileInfo, VirtualFiles};
use crate::error::TemplateResult;

/// Files under a root directory on disk.
///
/// Virtual paths are resolved relative to the root. Paths containing `..`
/// segments are treated as missing so a page can never read outside it.
#[derive(Debug, Clone)]
pub struct FileSystemVirtualFiles {
    root: PathBuf,
}

impl FileSystemVirtualFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<(String, PathBuf)> {
        let path = normalize_path(path);
        if path.split('/').any(|segment| segment == "..") {
            return None;
        }
        let full = self.root.join(&path);
        Some((path, full))
    }
}

#[async_trait]
impl VirtualFiles for FileSystemVirtualFiles {
    async fn file_info(&self, path: &str) -> TemplateResult<Option<FileInfo>> {
        let Some((virtual_path, full)) = self.resolve(path) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(Some(FileInfo {
                virtual_path,
                last_modified: meta.modified()?,
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_all(&self, path: &str) -> TemplateResult<Vec<u8>> {
        match self.resolve(path) {
            Some((_, full)) => Ok(tokio::fs::read(full).await?),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("path escapes root: {}", path),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_files_under_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/intro.md"), "# Intro").unwrap();

        let files = FileSystemVirtualFiles::new(dir.path());
        let info = files.file_info("/docs/intro.md").await.unwrap().unwrap();
        assert_eq!(info.virtual_path, "docs/intro.md");
        assert_eq!(files.read_all("docs/intro.md").await.unwrap(), b"# Intro");
    }

    #[tokio::test]
    async fn test_directories_and_missing_files_have_no_info() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();

        let files = FileSystemVirtualFiles::new(dir.path());
        assert!(files.file_info("docs").await.unwrap().is_none());
        assert!(files.file_info("missing.html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parent_segments_are_rejected() {
        let dir = TempDir::new().unwrap();
        let files = FileSystemVirtualFiles::new(dir.path().join("site"));
        assert!(files.file_info("../secret.txt").await.unwrap().is_none());
        assert!(files.read_all("a/../../secret.txt").await.is_err());
    }
}
