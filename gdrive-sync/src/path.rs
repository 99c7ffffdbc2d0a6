use std::fmt;

use gdrive_core::WILDCARD;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path {path:?} must start with {namespace}/")]
    InvalidPath { path: String, namespace: String },
    #[error("path has no segments")]
    Empty,
    #[error("path segment {0:?} is not supported")]
    UnsupportedSegment(String),
}

/// A normalized, slash-delimited path relative to a root anchor.
///
/// Empty segments are dropped, so `a//b/` and `a/b` are the same path. `.`
/// and `..` are rejected, and the wildcard `*` may only appear last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `raw`, which must carry the `namespace` prefix (`gdrive/a/b`).
    pub fn parse(namespace: &str, raw: &str) -> Result<Self, PathError> {
        let rest = if raw == namespace {
            ""
        } else {
            raw.strip_prefix(namespace)
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| PathError::InvalidPath {
                    path: raw.to_string(),
                    namespace: namespace.to_string(),
                })?
        };
        Self::relative(rest)
    }

    /// Parses a path with no namespace prefix, for use against an explicit parent id.
    pub fn relative(raw: &str) -> Result<Self, PathError> {
        let segments: Vec<String> = raw
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        for (idx, segment) in segments.iter().enumerate() {
            if segment == "." || segment == ".." {
                return Err(PathError::UnsupportedSegment(segment.clone()));
            }
            if segment == WILDCARD && idx + 1 != segments.len() {
                return Err(PathError::UnsupportedSegment(segment.clone()));
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<VirtualPath> {
        let (_, head) = self.segments.split_last()?;
        Some(Self {
            segments: head.to_vec(),
        })
    }

    /// Splits into the containing directory and the final segment.
    pub fn split_file(&self) -> Result<(VirtualPath, &str), PathError> {
        let (name, head) = self.segments.split_last().ok_or(PathError::Empty)?;
        Ok((
            Self {
                segments: head.to_vec(),
            },
            name.as_str(),
        ))
    }

    /// Appends one concrete name. The wildcard is never a name.
    pub fn join(&self, segment: &str) -> Result<VirtualPath, PathError> {
        if segment.is_empty()
            || segment.contains('/')
            || matches!(segment, "." | ".." | WILDCARD)
        {
            return Err(PathError::UnsupportedSegment(segment.to_string()));
        }
        if self.file_name() == Some(WILDCARD) {
            return Err(PathError::UnsupportedSegment(WILDCARD.to_string()));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Key under which this directory's checksums are cached. The root is `""`.
    pub fn cache_key(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
