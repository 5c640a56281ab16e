use std::io;

/// Errors from digest operations.
#[derive(Debug, thiserror::Error)]
pub enum HasherError {
    /// The algorithm name is not one of the supported digest functions.
    #[error("unsupported hash algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    /// Reading or seeking the input failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crypto crate.
pub type Result<T> = std::result::Result<T, HasherError>;
