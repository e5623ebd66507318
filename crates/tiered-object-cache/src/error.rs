//! Diagnostic error types for the disk tier
//!
//! The cache is advisory: no public operation returns an error. These types
//! exist so disk helpers can describe what failed before the failure is
//! logged and swallowed.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum StoreError {
    /// Reading or writing an entry file failed.
    Io(PathBuf, std::io::Error),
    /// Listing the tier directory failed.
    List(PathBuf, std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(path, err) => write!(f, "I/O error on {}: {}", path.display(), err),
            StoreError::List(path, err) => {
                write!(f, "failed to list {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(_, err) | StoreError::List(_, err) => Some(err),
        }
    }
}

pub(crate) type StoreResult<T> = std::result::Result<T, StoreError>;
