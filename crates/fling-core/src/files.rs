//! Shared file descriptors and filesystem helpers.
//!
//! A [`SharedFile`] describes one file offered for transfer: its display
//! name (unique within a session), byte size, MIME type, and an opaque
//! source locator. On the sender side the locator is usually a plain
//! filesystem path; on mobile platforms it can be a content-addressed URI
//! that must be materialized to a temporary file before streaming.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One file offered for transfer.
///
/// Immutable once a transfer of it begins; handlers snapshot the entry at
/// dispatch and never re-resolve size or locator mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    /// Display name, unique within a session
    pub name: String,
    /// MIME type (or a coarse type tag from the platform)
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in bytes
    pub size: u64,
    /// Opaque source locator: a filesystem path or a platform URI
    pub uri: String,
}

impl SharedFile {
    /// Build a descriptor from a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not name a readable file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;

        if !metadata.is_file() {
            return Err(Error::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?
            .to_string_lossy()
            .to_string();

        let kind = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            name,
            kind,
            size: metadata.len(),
            uri: path.display().to_string(),
        })
    }

    /// Whether the locator is a plain filesystem path (as opposed to a
    /// content-addressed platform URI that needs materializing).
    #[must_use]
    pub fn is_plain_path(&self) -> bool {
        !self.uri.contains("://")
    }
}

/// Resolves non-path source locators into readable files.
///
/// Platform layers (Android content resolvers and the like) implement this;
/// the default [`FsResolver`] only understands plain paths.
pub trait SourceResolver: Send + Sync {
    /// Copy the locator's content into the given temporary path.
    ///
    /// # Errors
    ///
    /// Returns an error if the locator cannot be resolved or read.
    fn materialize(&self, uri: &str, dest: &Path) -> Result<()>;
}

/// Default resolver: only plain filesystem paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResolver;

impl SourceResolver for FsResolver {
    fn materialize(&self, uri: &str, dest: &Path) -> Result<()> {
        let src = PathBuf::from(uri);
        if !src.is_file() {
            return Err(Error::UnresolvableSource(uri.to_string()));
        }
        std::fs::copy(&src, dest)?;
        Ok(())
    }
}

/// Strip path components from a peer-supplied file name.
///
/// Upload destinations are always a bare name inside the configured
/// directory; `../` and absolute prefixes from the wire are discarded.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let base = name.rsplit('/').next().unwrap_or("");
    let base = base.trim();
    if base.is_empty() || base == "." || base == ".." {
        "unnamed".to_string()
    } else {
        base.to_string()
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shared_file_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"hello").unwrap();

        let file = SharedFile::from_path(&path).unwrap();
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.size, 5);
        assert_eq!(file.kind, "application/pdf");
        assert!(file.is_plain_path());
    }

    #[test]
    fn test_shared_file_missing() {
        assert!(SharedFile::from_path(Path::new("/no/such/file.bin")).is_err());
    }

    #[test]
    fn test_content_uri_not_plain_path() {
        let file = SharedFile {
            name: "photo.jpg".to_string(),
            kind: "image/jpeg".to_string(),
            size: 10,
            uri: "content://media/external/images/42".to_string(),
        };
        assert!(!file.is_plain_path());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("dir\\sub\\file.bin"), "file.bin");
        assert_eq!(sanitize_file_name(".."), "unnamed");
        assert_eq!(sanitize_file_name(""), "unnamed");
    }

    #[test]
    fn test_fs_resolver_materialize() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.bin");
        let dst = dir.path().join("b.bin");
        std::fs::write(&src, b"payload").unwrap();

        FsResolver
            .materialize(&src.display().to_string(), &dst)
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_fs_resolver_rejects_uri() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("out.bin");
        let err = FsResolver.materialize("content://media/1", &dst);
        assert!(matches!(err, Err(Error::UnresolvableSource(_))));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
