//! Stream URIs (`scheme://target`)
//!
//! Source images and derivatives are addressed by scheme-qualified URIs.
//! The scheme selects a storage area (public, private, temporary) and the
//! target is the relative path inside it.

use crate::error::{CropError, CropResult};
use std::fmt;

/// Separator between scheme and target
const SCHEME_SEPARATOR: &str = "://";

/// Replacement for `.` when a target is turned into a folder name
pub const DOT_ESCAPE: &str = "__";

/// A parsed `scheme://target` URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamUri {
    scheme: String,
    target: String,
}

impl StreamUri {
    /// Parse and normalize a URI
    ///
    /// The target is trimmed of leading and trailing slashes so that
    /// `public:///a/b.jpg` and `public://a/b.jpg` are the same file.
    pub fn parse(uri: &str) -> CropResult<Self> {
        let (scheme, rest) = uri
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| CropError::invalid_source(uri, "missing scheme"))?;

        if scheme.is_empty() {
            return Err(CropError::invalid_source(uri, "empty scheme"));
        }
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            return Err(CropError::invalid_source(uri, "invalid scheme characters"));
        }

        let target = rest.trim_matches(|c| c == '/' || c == '\\');
        if target.is_empty() {
            return Err(CropError::invalid_source(uri, "empty target"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            target: target.to_string(),
        })
    }

    /// Build from already-split parts
    pub fn new(scheme: impl Into<String>, target: impl AsRef<str>) -> CropResult<Self> {
        let scheme = scheme.into();
        Self::parse(&format!("{}{}{}", scheme, SCHEME_SEPARATOR, target.as_ref()))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Final path segment of the target
    pub fn file_name(&self) -> &str {
        self.target.rsplit('/').next().unwrap_or(&self.target)
    }

    /// Extension of the file name, without the dot
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Target with every `.` replaced, used as a folder name
    pub fn escaped_target(&self) -> String {
        escape_target(&self.target)
    }

    /// The same URI with one trailing extension segment removed
    ///
    /// `public://a/image.png.jpeg` becomes `public://a/image.png`.
    pub fn without_extension(&self) -> Option<Self> {
        self.extension()?;
        let cut = self.target.rfind('.')?;
        Some(Self {
            scheme: self.scheme.clone(),
            target: self.target[..cut].to_string(),
        })
    }

    /// The same target under another scheme
    pub fn with_scheme(&self, scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            target: self.target.clone(),
        }
    }

    /// Append a path segment
    pub fn join(&self, segment: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            target: format!("{}/{}", self.target, segment.trim_matches('/')),
        }
    }

    /// Whether `other` lives below this URI
    pub fn contains(&self, other: &StreamUri) -> bool {
        self.scheme == other.scheme
            && other.target.len() > self.target.len()
            && other.target.starts_with(&self.target)
            && other.target.as_bytes()[self.target.len()] == b'/'
    }
}

impl fmt::Display for StreamUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.target)
    }
}

/// Replace every `.` in a target with `__`
pub fn escape_target(target: &str) -> String {
    target.replace('.', DOT_ESCAPE)
}

/// Best-effort inverse of [`escape_target`] for the final segment
///
/// Only the last `__` of the last segment is turned back into the
/// extension dot. Dots elsewhere in the original target cannot be told
/// apart from literal double underscores, so callers that know the real
/// source (from a crop record) must prefer it.
pub fn unescape_file_name(escaped: &str) -> String {
    let (dir, name) = match escaped.rfind('/') {
        Some(idx) => (&escaped[..=idx], &escaped[idx + 1..]),
        None => ("", escaped),
    };
    match name.rfind(DOT_ESCAPE) {
        Some(idx) if idx > 0 && idx + DOT_ESCAPE.len() < name.len() => format!(
            "{}{}.{}",
            dir,
            &name[..idx],
            &name[idx + DOT_ESCAPE.len()..]
        ),
        _ => escaped.to_string(),
    }
}
