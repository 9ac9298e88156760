//! Materialized download results
//!
//! The downloaded derived object is spilled to a named temp file; the path
//! is the locally-resolvable handle handed to callers. Releasing the handle
//! (or dropping it) removes the file, so byte buffers never accumulate
//! across runs.

use bytes::Bytes;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub struct MaterializedObject {
    file: NamedTempFile,
    content_type: String,
    len: u64,
}

impl MaterializedObject {
    /// Spill downloaded bytes to a fresh temp file.
    pub fn materialize(bytes: &Bytes, content_type: String) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            content_type,
            len: bytes.len() as u64,
        })
    }

    /// Local path resolving to the downloaded bytes. Valid until release.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the bytes out to a caller-chosen location.
    pub fn persist_to(&self, dest: &Path) -> std::io::Result<u64> {
        std::fs::copy(self.path(), dest)
    }

    /// Delete the backing file. Dropping the handle has the same effect.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}
