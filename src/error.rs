// 🚨 Error taxonomy for the mapping core
//
// Every fallible core operation returns MappingError. Mutations that fail
// leave the connection store exactly as it was.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A source registry is missing, unreadable or has fewer than two rows
    #[error("failed to read registry {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    /// Confirm/revoke without a usable selection
    #[error("no selection: {0}")]
    NoSelection(String),

    /// The connections file exists but cannot be parsed or written
    #[error("connections file {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

impl MappingError {
    pub fn source_read(path: &Path, reason: impl ToString) -> Self {
        MappingError::SourceRead {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: &Path, reason: impl ToString) -> Self {
        MappingError::Persistence {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MappingError::source_read(Path::new("hospital.csv"), "only 1 row");
        assert_eq!(
            err.to_string(),
            "failed to read registry hospital.csv: only 1 row"
        );

        let err = MappingError::NoSelection("select a company row".to_string());
        assert_eq!(err.to_string(), "no selection: select a company row");
    }
}
