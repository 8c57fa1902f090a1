use std::path::PathBuf;
use thiserror::Error;

/// Structured error taxonomy for the graph. Per-file problems
/// (`FileTooLarge`, `FileUnreadable`, `ParseError`) are collected on file
/// records during indexing and never abort a run; the remaining variants
/// terminate the operation that raised them.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("not initialized: no index found under {0}")]
    NotInitialized(PathBuf),

    #[error("already initialized: {0} exists")]
    AlreadyInitialized(PathBuf),

    #[error("index is locked: {0}")]
    LockBusy(String),

    #[error("file too large: {path} is {size} bytes (limit {limit})")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("unreadable file {path}: {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("parse error in {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("migration to schema v{version} failed: {source}")]
    MigrationFailed {
        version: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("index store is corrupt or unsupported: {0}")]
    StoreCorrupt(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    /// Whether the caller can reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GraphError::LockBusy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_their_kind() {
        let e = GraphError::NotInitialized(PathBuf::from("/p/.codegraph/codegraph.db"));
        assert!(e.to_string().contains("not initialized"));
        let e = GraphError::AlreadyInitialized(PathBuf::from("/p/.codegraph"));
        assert!(e.to_string().contains("already initialized"));
        let e = GraphError::LockBusy("pid 42".into());
        assert!(e.to_string().contains("locked"));
    }

    #[test]
    fn only_lock_busy_is_retryable() {
        assert!(GraphError::LockBusy("x".into()).is_retryable());
        assert!(!GraphError::Cancelled.is_retryable());
        assert!(!GraphError::StoreCorrupt("bad".into()).is_retryable());
    }

    #[test]
    fn per_file_variants_carry_context() {
        let e = GraphError::FileTooLarge {
            path: "big.ts".into(),
            size: 2048,
            limit: 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("big.ts") && msg.contains("2048") && msg.contains("1024"));
        let e = GraphError::ParseError {
            path: "a.ts".into(),
            message: "unbalanced braces".into(),
        };
        assert!(e.to_string().contains("a.ts"));
    }
}
