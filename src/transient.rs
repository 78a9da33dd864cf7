//! Request-scoped temporary files.
//!
//! A [`TransientFile`] is removed when it is closed or dropped, so an upload
//! copy never outlives the request that created it, whichever step fails.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Longest sanitized name embedded in a transient file name. Leaves room for
/// the `temp_<random>_` prefix under the usual 255-byte file name limit.
const MAX_NAME_BYTES: usize = 200;

pub struct TransientFile {
    file: NamedTempFile,
    out: tokio::fs::File,
    written: u64,
}

impl TransientFile {
    /// Create an empty file under `dir` named `temp_<random>_<original name>`.
    pub fn create(dir: &Path, original_name: &str) -> Result<Self> {
        let name = sanitize_file_name(original_name);
        let file = tempfile::Builder::new()
            .prefix("temp_")
            .suffix(&format!("_{}", name))
            .tempfile_in(dir)?;
        let out = tokio::fs::File::from_std(file.reopen()?);

        Ok(Self {
            file,
            out,
            written: 0,
        })
    }

    /// Stream `reader` into a new transient file under `dir`.
    pub async fn persist<R>(dir: &Path, original_name: &str, reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut transient = Self::create(dir, original_name)?;
        transient.written = tokio::io::copy(reader, &mut transient.out).await?;
        transient.finish().await?;
        Ok(transient)
    }

    /// Append one chunk of upload data.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.out.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush written data to disk.
    pub async fn finish(&mut self) -> Result<()> {
        self.out.flush().await?;
        self.out.sync_all().await?;
        tracing::debug!(
            "Persisted {} bytes to {}",
            self.written,
            self.path().display()
        );
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, reporting any failure.
    pub fn close(self) -> Result<()> {
        let Self { file, out, .. } = self;
        drop(out);

        let path: PathBuf = file.path().to_path_buf();
        file.close().map_err(|e| {
            tracing::error!("Failed to remove {}: {}", path.display(), e);
            Error::Storage(format!("Failed to remove {}: {}", path.display(), e))
        })
    }
}

/// Final path component of a client-supplied name, with characters that are
/// awkward in file names replaced and overlong names shortened.
fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        truncate_keeping_extension(cleaned)
    }
}

fn truncate_keeping_extension(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= 16 => name.split_at(idx),
        _ => (name, ""),
    };

    let mut end = MAX_NAME_BYTES - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], extension)
}
