//! Virtual paths.
//!
//! Unix style on every host: `/` separates segments, a leading `/` makes the
//! path absolute, `""` means the current directory and `"/"` the root. One
//! trailing `/` is accepted. Empty segments (`a//b`) are rejected. Segments
//! are matched exactly; `.` and `..` carry no special meaning.

use crate::error::ApiError;
use std::fmt;
use std::str::FromStr;

/// A parsed virtual path, absolute or relative to the current directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    absolute: bool,
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw.contains("//") {
            return Err(ApiError::InvalidPath(format!(
                "{:?} contains an empty segment",
                raw
            )));
        }
        let absolute = raw.starts_with('/');
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').map(str::to_string).collect()
        };
        Ok(Self { absolute, segments })
    }

    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    pub fn current() -> Self {
        Self {
            absolute: false,
            segments: Vec::new(),
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Append one segment. The name must not contain `/` or be empty.
    pub fn join(&self, name: &str) -> Result<Self, ApiError> {
        if name.is_empty() || name.contains('/') {
            return Err(ApiError::InvalidPath(format!(
                "{:?} is not a valid path segment",
                name
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            absolute: self.absolute,
            segments,
        })
    }

    /// Resolve against an absolute base (the current directory).
    pub fn to_absolute(&self, cwd: &[String]) -> Vec<String> {
        if self.absolute {
            self.segments.clone()
        } else {
            cwd.iter().chain(self.segments.iter()).cloned().collect()
        }
    }
}

impl FromStr for VirtualPath {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VirtualPath::parse(s)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str(&render(&self.segments))
        } else {
            f.write_str(&self.segments.join("/"))
        }
    }
}

/// Render absolute segments as a path string (`/` for the root).
pub fn render(segments: &[String]) -> String {
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Whether `path` equals `prefix` or lies below it.
pub fn starts_with(path: &[String], prefix: &[String]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}
