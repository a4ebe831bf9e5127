//! Session output files, staged under a temporary name until finalized.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::MotionError;

/// Suffix carried by in-progress files; the final name only ever appears
/// via the rename in `finalize`, so a crash never leaves a complete-looking
/// but truncated recording.
pub const TEMP_FILE_SUFFIX: &str = ".saving";

/// One output file of a recording session.
pub struct FileSink {
    file: BufWriter<File>,
    final_path: PathBuf,
    temp_path: PathBuf,
    written: u64,
    size_limit: u64,
}

impl FileSink {
    /// Open `<path>.saving` for writing. `size_limit` is in bytes, 0 means
    /// unlimited.
    pub fn create<P: AsRef<Path>>(path: P, size_limit: u64) -> Result<Self, MotionError> {
        let final_path = path.as_ref().to_path_buf();
        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                MotionError::WriterError(format!("invalid output path {:?}", final_path))
            })?;
        let temp_path = final_path.with_file_name(format!("{}{}", file_name, TEMP_FILE_SUFFIX));

        let file = File::create(&temp_path).map_err(|e| {
            MotionError::WriterError(format!("failed to open {:?}: {}", temp_path, e))
        })?;
        log::info!("Opened motion file {:?}", temp_path);

        Ok(Self {
            file: BufWriter::new(file),
            final_path,
            temp_path,
            written: 0,
            size_limit,
        })
    }

    /// Append one chunk. Once the size ceiling has been reached the chunk
    /// is consumed and discarded, so queue draining never stalls on a full
    /// file.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), MotionError> {
        if self.size_limit != 0 && self.written >= self.size_limit {
            return Ok(());
        }
        self.file.write_all(chunk).map_err(|e| {
            MotionError::IoError(format!("failed to write {:?}: {}", self.temp_path, e))
        })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Abandon the session file, removing the temporary.
    pub fn discard(self) {
        let FileSink {
            file, temp_path, ..
        } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&temp_path) {
            log::warn!("Failed to remove {:?}: {}", temp_path, e);
        }
    }

    /// Flush, close, and atomically rename to the final name.
    pub fn finalize(self) -> Result<PathBuf, MotionError> {
        let FileSink {
            file,
            final_path,
            temp_path,
            written,
            ..
        } = self;

        let file = file.into_inner().map_err(|e| {
            MotionError::IoError(format!("failed to flush {:?}: {}", temp_path, e))
        })?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|e| {
            MotionError::IoError(format!(
                "failed to rename {:?} to {:?}: {}",
                temp_path, final_path, e
            ))
        })?;
        log::info!("Closed motion file {:?}, size: {}", final_path, written);
        Ok(final_path)
    }
}
