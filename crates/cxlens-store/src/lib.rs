//! Temporary source storage for one submission.
//!
//! Every stored submission gets its own file, named with a fresh v4 UUID and
//! opened with create-new semantics, so two concurrent submissions can never
//! share a path. The returned [`TempSource`] owns the file: calling
//! [`TempSource::release`] removes it and reports failures, and dropping the
//! handle removes it on every other exit path (early return, cancellation,
//! panic unwinding).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// File-name prefix for every stored submission.
pub const TEMP_PREFIX: &str = "cxlens-";

/// Errors from the temporary source store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to prepare temp root {path}: {source}")]
    Root {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create temp source {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write temp source {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove temp source {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Allocates uniquely-named files for submitted source bytes.
#[derive(Debug, Clone)]
pub struct TempSourceStore {
    root: PathBuf,
    suffix: String,
}

impl TempSourceStore {
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Store rooted at the OS temp directory.
    pub fn system(suffix: impl Into<String>) -> Self {
        Self::new(std::env::temp_dir(), suffix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Write `bytes` to a fresh, never-before-used file under the root.
    pub fn store(&self, bytes: &[u8]) -> Result<TempSource, StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Root {
            path: self.root.display().to_string(),
            source,
        })?;

        let path = self
            .root
            .join(format!("{TEMP_PREFIX}{}{}", Uuid::new_v4(), self.suffix));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| StoreError::Create {
                path: path.display().to_string(),
                source,
            })?;

        // From here on the guard owns the path, so a failed write still
        // cleans up after itself.
        let source = TempSource {
            path,
            len: bytes.len() as u64,
            released: false,
        };
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|err| StoreError::Write {
                path: source.path.display().to_string(),
                source: err,
            })?;

        tracing::debug!(path = %source.path.display(), bytes = source.len, "stored submission");
        Ok(source)
    }
}

/// Scoped handle to one stored submission.
#[derive(Debug)]
pub struct TempSource {
    path: PathBuf,
    len: u64,
    released: bool,
}

impl TempSource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove the stored file, reporting removal failures.
    ///
    /// A file that is already gone counts as released.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        remove_if_present(&self.path).map_err(|source| StoreError::Remove {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl Drop for TempSource {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = remove_if_present(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temp source");
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
