//! Content-addressed file store.
//!
//! Every object is a regular file named by the hex digest of its own bytes
//! and placed in a directory tree derived from that digest, in the spirit of
//! git's `.git/objects/` layout but with a configurable number of levels.
//!
//! # Layout
//!
//! With the default depth of 3, a SHA-1 digest is split into segments of
//! 2, 4 and 8 characters, and the remainder names the file:
//!
//! ```text
//! <root>/ee/127a/5e7d57fa/bfeb814631f408d9e18b7ab339
//! ```
//!
//! The root also holds `.shardfs.conf`, the configuration written when the
//! store was created. It is never rewritten afterwards.
//!
//! # Design Rules
//!
//! 1. Objects appear atomically: a reader sees no file or the whole file.
//! 2. Adding content that is already stored is a no-op.
//! 3. Directories are created on demand and pruned when they become empty.
//! 4. There is no index or lock file; the tree itself is the state.
//! 5. Keys are validated before any filesystem access.
//!
//! # Example
//!
//! ```no_run
//! use shardfs_store::Store;
//!
//! # fn main() -> shardfs_store::StoreResult<()> {
//! let store = Store::open_default("/var/lib/objects")?;
//! let digest = store.add_bytes(b"hello world!!!!".to_vec())?;
//! assert!(store.exists(&digest)?);
//! assert_eq!(store.read(&digest)?, b"hello world!!!!");
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod config;
pub mod error;
pub mod mode;
pub mod paths;
pub mod shard;
pub mod source;
pub mod store;
pub mod tree;
pub mod walk;

pub use atomic::AtomicWriter;
pub use config::{StoreConfig, StoreOptions, CONFIG_FILE};
pub use error::{StoreError, StoreResult};
pub use mode::Mode;
pub use shard::Depth;
pub use shardfs_crypto::HashAlgorithm;
pub use source::ContentSource;
pub use store::Store;
pub use tree::DirTree;
pub use walk::{Corrupted, Digests, ObjectEntry, Objects};
