//! Uri - Normalized resource identifiers for workspace entries

use crate::{FsError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

/// An immutable `scheme://absolute/path` identifier
///
/// Features:
/// - Normalized string form (no `.`/`..` segments, no trailing slash)
/// - Percent-encoding of reserved characters in segments
/// - Hash-based ID for fast lookups
/// - Lossless conversion to and from `file` paths
#[derive(Clone)]
pub struct Uri {
    url: Url,

    /// Hash of the normalized string form
    id: u64,
}

impl Uri {
    /// Parse a URI string such as `file:///home/user/project`
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| FsError::InvalidUri(format!("{}: {}", input, e)))?;

        if url.cannot_be_a_base() {
            return Err(FsError::InvalidUri(format!("{}: not a hierarchical URI", input)));
        }

        Ok(Self::from_url(url))
    }

    /// Create a `file` URI from an absolute path
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let url = Url::from_file_path(path)
            .map_err(|_| FsError::InvalidUri(format!("Not an absolute path: {}", path.display())))?;
        Ok(Self::from_url(url))
    }

    fn from_url(mut url: Url) -> Self {
        // Empty segments (`a//b`, trailing `/`) name nothing on disk
        let collapsed = url.path_segments().and_then(|segments| {
            let segments: Vec<&str> = segments.collect();
            segments
                .iter()
                .any(|s| s.is_empty())
                .then(|| segments.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/"))
        });
        if let Some(path) = collapsed {
            url.set_path(&format!("/{}", path));
        }
        let id = xxh3_64(url.as_str().as_bytes());
        Self { url, id }
    }

    /// Get the URI scheme (e.g. `file`)
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Get the normalized string form
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Get the hash ID for lookups
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Decoded path segments, root first
    pub fn segments(&self) -> Vec<String> {
        self.url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        urlencoding::decode(s)
                            .map(|d| d.into_owned())
                            .unwrap_or_else(|_| s.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last path segment, `None` for the root
    pub fn file_name(&self) -> Option<String> {
        self.segments().pop()
    }

    /// Is this the root of its scheme/authority?
    pub fn is_root(&self) -> bool {
        self.url.path() == "/"
    }

    /// Append a relative path (`a`, `a/b`, `../c`)
    pub fn join(&self, relative: &str) -> Self {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in relative.split('/') {
                match segment {
                    "" | "." => {}
                    ".." => {
                        segments.pop();
                    }
                    s => {
                        segments.push(s);
                    }
                }
            }
        }
        Self::from_url(url)
    }

    /// Get parent URI, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        let mut url = self.url.clone();
        url.path_segments_mut().ok()?.pop();
        Some(Self::from_url(url))
    }

    /// Path of `other` relative to `self`, if `other` is `self` or a descendant
    ///
    /// Returns an empty string when both are equal.
    pub fn relative(&self, other: &Uri) -> Option<String> {
        if self.url.scheme() != other.url.scheme() || self.url.host_str() != other.url.host_str() {
            return None;
        }

        let base = self.segments();
        let target = other.segments();

        if target.len() < base.len() || target[..base.len()] != base[..] {
            return None;
        }

        Some(target[base.len()..].join("/"))
    }

    /// Is `other` equal to or below this URI?
    pub fn is_equal_or_parent_of(&self, other: &Uri) -> bool {
        self.relative(other).is_some()
    }

    /// Convert to a local path for file system operations
    pub fn to_file_path(&self) -> Result<PathBuf> {
        if self.url.scheme() != "file" {
            return Err(FsError::InvalidUri(format!(
                "Unsupported scheme '{}': {}",
                self.url.scheme(),
                self
            )));
        }

        self.url
            .to_file_path()
            .map_err(|_| FsError::InvalidUri(format!("Not a local file URI: {}", self)))
    }
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Uri {}

impl Hash for Uri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for Uri {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Uri {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl FromStr for Uri {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&Path> for Uri {
    type Error = FsError;

    fn try_from(path: &Path) -> Result<Self> {
        Self::from_file_path(path)
    }
}

impl TryFrom<PathBuf> for Uri {
    type Error = FsError;

    fn try_from(path: PathBuf) -> Result<Self> {
        Self::from_file_path(path)
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uri({})", self.as_str())
    }
}

impl Serialize for Uri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Uri::parse(&s).map_err(serde::de::Error::custom)
    }
}
