//! Normalized path handling for cross-platform compatibility

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A path normalized to use forward slashes internally.
///
/// Backslashes become forward slashes, `.` segments and repeated
/// separators are dropped, and `..` segments are resolved lexically.
/// A leading `..` on a relative path is discarded so that a relative
/// path can never climb above the directory it is joined to.
///
/// Manifest keys are relative `NormalizedPath` strings, which keeps them
/// identical across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path_str = path.as_ref().to_string_lossy();
        Self {
            inner: clean(&path_str),
        }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Join this path with a segment, resolving dot segments.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_start_matches(['/', '\\']);
        if clean(segment).is_empty() && !segment.contains("..") {
            return self.clone();
        }
        if self.inner.is_empty() {
            return Self {
                inner: clean(segment),
            };
        }
        Self {
            inner: clean(&format!("{}/{}", self.inner.trim_end_matches('/'), segment)),
        }
    }

    /// Get the parent directory.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.inner.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) if idx > 0 => Some(Self {
                inner: trimmed[..idx].to_string(),
            }),
            Some(0) if trimmed.len() > 1 => Some(Self {
                inner: "/".to_string(),
            }),
            _ => None,
        }
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        let trimmed = self.inner.trim_end_matches('/');
        trimmed.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        self.file_name().and_then(|name| {
            let idx = name.rfind('.')?;
            if idx == 0 { None } else { Some(&name[idx + 1..]) }
        })
    }

    /// Whether this is a relative path that stays inside its base directory.
    pub fn is_relative(&self) -> bool {
        !self.inner.is_empty() && !self.inner.starts_with('/') && !has_drive_prefix(&self.inner)
    }

    /// Check whether this path starts with `prefix` on a component boundary.
    pub fn starts_with(&self, prefix: &NormalizedPath) -> bool {
        if prefix.inner.is_empty() {
            return true;
        }
        self.inner == prefix.inner
            || self
                .inner
                .strip_prefix(prefix.inner.as_str())
                .is_some_and(|rest| rest.starts_with('/') || prefix.inner.ends_with('/'))
    }

    /// Express a native `path` relative to `base`.
    ///
    /// Returns `None` when `path` is not located under `base`.
    pub fn relative_to(path: &Path, base: &Path) -> Option<Self> {
        let rel = path.strip_prefix(base).ok()?;
        let normalized = Self::new(rel);
        normalized.is_relative().then_some(normalized)
    }

    /// Check if this path exists on the filesystem.
    pub fn exists(&self) -> bool {
        self.to_native().exists()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.to_native().is_dir()
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.to_native().is_file()
    }

    /// Check if this appears to be a network path.
    pub fn is_network_path(&self) -> bool {
        self.inner.starts_with("//")
            || self.inner.starts_with("smb://")
            || self.inner.starts_with("nfs://")
    }
}

/// Validate a tracked relative path read from untrusted input.
///
/// The string must already be in normalized form and must be relative,
/// so that joining it to the working tree root cannot leave the tree.
pub fn validate_relative_path(raw: &str) -> Result<NormalizedPath> {
    let normalized = NormalizedPath::new(raw);
    if normalized.as_str() != raw || !normalized.is_relative() {
        return Err(Error::PathEscapesRoot {
            path: raw.to_string(),
        });
    }
    Ok(normalized)
}

/// Why a native file name cannot become a `NormalizedPath` component
/// without changing its meaning, if it cannot.
///
/// Non-UTF-8 names would be rewritten lossily. On Unix a backslash is an
/// ordinary name character that normalization would turn into a separator.
pub fn unrepresentable_name(name: &OsStr) -> Option<&'static str> {
    match name.to_str() {
        None => Some("file name is not valid UTF-8"),
        Some(s) if cfg!(unix) && s.contains('\\') => Some("file name contains a backslash"),
        Some(_) => None,
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn clean(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let network = unified.starts_with("//") && !unified.starts_with("///");
    let absolute = unified.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    if network {
        format!("//{}", body)
    } else if absolute {
        format!("/{}", body)
    } else {
        body
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

impl serde::Serialize for NormalizedPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner)
    }
}
