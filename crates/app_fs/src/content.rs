//! File content access with encoding support and optimistic concurrency

use crate::encoding::{self, EncodingHint};
use crate::stat::{map_io, stat_path};
use crate::{FileContent, FsError, Result, Stat, Uri};
use encoding_rs::Encoding;

/// Reads and writes file text using a configurable default encoding
#[derive(Debug, Clone)]
pub struct ContentStore {
    default_encoding: &'static Encoding,
    hint: EncodingHint,
}

impl ContentStore {
    /// Create a store whose default encoding is the given WHATWG label
    pub fn new(default_encoding: &str) -> Result<Self> {
        Ok(Self {
            default_encoding: encoding::resolve_encoding(default_encoding)?,
            hint: encoding::system_encoding_hint(),
        })
    }

    pub fn default_encoding(&self) -> &'static Encoding {
        self.default_encoding
    }

    /// Resolve an optional caller-supplied label, falling back to the default
    pub fn encoding_for(&self, label: Option<&str>) -> Result<&'static Encoding> {
        match label {
            Some(label) => encoding::resolve_encoding(label),
            None => Ok(self.default_encoding),
        }
    }

    /// Read and decode a file
    pub fn resolve_content(&self, uri: &Uri, label: Option<&str>) -> Result<FileContent> {
        let path = uri.to_file_path()?;
        let stat = self.require_file(&path, uri)?;
        let encoding = self.encoding_for(label)?;

        let bytes = std::fs::read(&path).map_err(|e| map_io(e, uri))?;
        let (content, _) = encoding::decode_bytes(&bytes, encoding);

        tracing::debug!("Read {} bytes from {} as {}", bytes.len(), uri, encoding.name());
        Ok(FileContent { stat, content })
    }

    /// Replace a file's content if it still matches `expected`
    ///
    /// The live stat is recomputed and compared on size and modification
    /// time; any drift rejects the write with [`FsError::OutOfSync`].
    pub fn set_content(&self, expected: &Stat, content: &str, label: Option<&str>) -> Result<Stat> {
        let uri = &expected.uri;
        let path = uri.to_file_path()?;
        let live = self.require_file(&path, uri)?;
        let encoding = self.encoding_for(label)?;

        if !expected.is_in_sync_with(&live) {
            tracing::warn!(
                "Rejected stale write to {} (expected size={:?} mtime={}, found size={:?} mtime={})",
                uri,
                expected.size,
                expected.last_modification,
                live.size,
                live.last_modification
            );
            return Err(FsError::OutOfSync(uri.clone()));
        }

        let bytes = encoding::encode_text(content, encoding);
        std::fs::write(&path, &bytes).map_err(|e| map_io(e, uri))?;

        tracing::info!("Wrote {} bytes to {}", bytes.len(), uri);
        stat_path(&path, uri, false)
    }

    /// Detect the text encoding of a file
    pub fn get_encoding(&self, uri: &Uri) -> Result<String> {
        let path = uri.to_file_path()?;
        self.require_file(&path, uri)?;

        let bytes = std::fs::read(&path).map_err(|e| map_io(e, uri))?;
        let encoding = encoding::detect_encoding(&bytes, self.default_encoding, self.hint);

        Ok(encoding.name().to_string())
    }

    fn require_file(&self, path: &std::path::Path, uri: &Uri) -> Result<Stat> {
        let stat = stat_path(path, uri, false)?;
        if !stat.is_file() {
            return Err(FsError::NotAFile(uri.clone()));
        }
        Ok(stat)
    }
}
