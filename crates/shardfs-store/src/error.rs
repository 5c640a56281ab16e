use std::io;
use std::path::PathBuf;

use shardfs_crypto::HasherError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Tree depth was negative or out of range.
    #[error("invalid depth {0}: must be a non-negative integer")]
    InvalidDepth(i64),

    /// The digest cannot be turned into a path inside the store.
    #[error("invalid digest {digest:?}: {reason}")]
    InvalidDigest { digest: String, reason: String },

    /// The digest has fewer characters than the sharding scheme consumes.
    #[error("digest {digest:?} too short for depth {depth}: need at least {min} characters")]
    DigestTooShort {
        digest: String,
        depth: u32,
        min: usize,
    },

    /// A lookup key was rejected before touching the filesystem.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Caller-supplied content or parameters are unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No stored object exists for the digest.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The path has no store configuration.
    #[error("no store found at {}", .0.display())]
    Uninitialized(PathBuf),

    /// Insufficient filesystem rights to create or write.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Something other than a directory sits where the tree expects one.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The directory tree contains a symlink or escapes its root.
    #[error("unsafe tree state at {}: {reason}", .path.display())]
    UnsafeTreeState { path: PathBuf, reason: String },

    /// Malformed or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Digest computation failed.
    #[error("hasher error: {0}")]
    Hasher(#[from] HasherError),

    /// The final rename of an atomic write failed.
    #[error("failed to place {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Whether the error rejects the caller's input rather than reporting a
    /// filesystem condition.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidDepth(_)
                | Self::InvalidDigest { .. }
                | Self::DigestTooShort { .. }
                | Self::InvalidKey { .. }
                | Self::InvalidInput(_)
                | Self::Hasher(HasherError::UnsupportedAlgorithm(_))
        )
    }

    /// Map an I/O error on `path` into the store taxonomy.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::Io(err),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
