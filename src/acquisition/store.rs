//! Append-only sample file.
//!
//! The file is created (truncated) at synchronisation with the fixed header,
//! then receives one pass-through line per valid record. Every append is
//! flushed before returning so an abandoned worker loses nothing.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::IngestError;
use crate::types::CSV_HEADER;

/// Append `.csv` when the name lacks it (case-insensitive).
pub fn ensure_csv_extension(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    let has_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if has_csv {
        path
    } else {
        let mut name = path.into_os_string();
        name.push(".csv");
        PathBuf::from(name)
    }
}

/// Exclusive writer for one session's sample file.
#[derive(Debug)]
pub struct SampleWriter {
    path: PathBuf,
    file: File,
    records: u64,
}

impl SampleWriter {
    /// Create the file, replacing any previous content, and write the header.
    pub async fn create(path: &Path) -> Result<Self, IngestError> {
        let file = File::create(path)
            .await
            .map_err(|e| IngestError::file_io(path, e))?;
        let mut writer = Self {
            path: path.to_path_buf(),
            file,
            records: 0,
        };
        writer.write_line(CSV_HEADER).await?;
        tracing::debug!(path = %path.display(), "Sample file created");
        Ok(writer)
    }

    /// Append one record line verbatim.
    pub async fn append(&mut self, text: &str) -> Result<(), IngestError> {
        self.write_line(text).await?;
        self.records += 1;
        Ok(())
    }

    async fn write_line(&mut self, text: &str) -> Result<(), IngestError> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| IngestError::file_io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| IngestError::file_io(&self.path, e))
    }

    /// Flush to disk and release the handle.
    pub async fn close(mut self) -> Result<u64, IngestError> {
        self.file
            .flush()
            .await
            .map_err(|e| IngestError::file_io(&self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| IngestError::file_io(&self.path, e))?;
        Ok(self.records)
    }

    pub const fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
