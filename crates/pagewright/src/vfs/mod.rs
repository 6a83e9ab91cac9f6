//! Virtual file sources.
//!
//! Pages are read through the [`VirtualFiles`] trait so the engine never
//! touches a concrete storage layer. Two implementations are provided:
//!
//! - [`MemoryVirtualFiles`]: an in-process map of files, used for tests and
//!   as the store for one-time pages
//! - [`FileSystemVirtualFiles`]: files under a root directory, read with
//!   `tokio::fs`
//!
//! Virtual paths always use `/` separators and never start with `/`. The
//! root directory is the empty string.

mod fs;
mod memory;

pub use fs::FileSystemVirtualFiles;
pub use memory::MemoryVirtualFiles;

use std::fmt::Debug;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::TemplateResult;

/// Metadata of a virtual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub virtual_path: String,
    pub last_modified: SystemTime,
}

/// A read-only source of page files.
#[async_trait]
pub trait VirtualFiles: Debug + Send + Sync {
    /// Returns metadata for the file at `path`, or `None` if it does not exist.
    async fn file_info(&self, path: &str) -> TemplateResult<Option<FileInfo>>;

    /// Reads the whole file at `path`.
    async fn read_all(&self, path: &str) -> TemplateResult<Vec<u8>>;

    async fn exists(&self, path: &str) -> TemplateResult<bool> {
        Ok(self.file_info(path).await?.is_some())
    }
}

/// Normalizes a path: `\` becomes `/`, leading `/` and `./` segments are
/// removed and repeated separators collapse.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trailing = path.ends_with('/');
    let mut out = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if trailing && !out.is_empty() {
        out.push('/');
    }
    out
}

/// Returns the directory containing `path`, or `None` for the root itself.
///
/// ```rust
/// use pagewright::vfs::parent_dir;
///
/// assert_eq!(parent_dir("a/b/page.html"), Some("a/b"));
/// assert_eq!(parent_dir("page.html"), Some(""));
/// assert_eq!(parent_dir(""), None);
/// ```
pub fn parent_dir(path: &str) -> Option<&str> {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|i| &path[..i]).unwrap_or(""))
}

/// Returns the extension of the last path segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(i) => Some(&name[i + 1..]),
    }
}

/// Removes the extension of the last path segment.
pub fn strip_extension(path: &str) -> &str {
    match extension(path) {
        Some(ext) => &path[..path.len() - ext.len() - 1],
        None => path,
    }
}

/// Joins a directory and a relative name, treating `""` as the root.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b.html"), "a/b.html");
        assert_eq!(normalize_path("a\\b\\c.md"), "a/b/c.md");
        assert_eq!(normalize_path("./a//b/"), "a/b/");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b.html"), Some("html"));
        assert_eq!(extension("a.b/c"), None);
        assert_eq!(extension(".hidden"), None);
        assert_eq!(extension("archive.tar.gz"), Some("gz"));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("a/b.html"), "a/b");
        assert_eq!(strip_extension("a.b/c"), "a.b/c");
    }

    #[test]
    fn test_parent_dir_walk_reaches_root() {
        let mut dirs = Vec::new();
        let mut current = parent_dir("a/b/c.html");
        while let Some(dir) = current {
            dirs.push(dir);
            current = parent_dir(dir);
        }
        assert_eq!(dirs, vec!["a/b", "a", ""]);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a/", "x"), "a/x");
    }
}
