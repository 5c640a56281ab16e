//! Digest functions for shardfs.
//!
//! Maps a byte stream to a lowercase hexadecimal digest under one of a fixed
//! set of named algorithms. The store treats these digests as opaque keys.
//!
//! All hashing wraps the RustCrypto implementations.

pub mod algorithm;
pub mod error;
pub mod hasher;

pub use algorithm::HashAlgorithm;
pub use error::{HasherError, Result};
pub use hasher::{digest_bytes, digest_file, digest_reader, digest_reader_restoring, verify_hex, Digester};
