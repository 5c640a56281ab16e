use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use shardfs_crypto::{digest_reader, digest_reader_restoring};
use tracing::{debug, warn};

use crate::atomic::AtomicWriter;
use crate::config::{self, StoreConfig, StoreOptions, CONFIG_FILE};
use crate::error::{StoreError, StoreResult};
use crate::paths::normalize_root;
use crate::shard;
use crate::source::ContentSource;
use crate::tree::DirTree;
use crate::walk::{Corrupted, Digests, Objects};

/// A content-addressed file store rooted at one directory.
///
/// Every object lives at the shard path of its own digest. The store keeps
/// no state beyond its configuration, so a `Store` can be shared freely
/// between threads and any number of handles may point at the same root.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
    tree: DirTree,
    writer: AtomicWriter,
}

impl Store {
    /// Open the store at `root`, creating it if needed.
    ///
    /// A new root is initialized from `options` and its config is persisted.
    /// An existing root keeps the config it was created with and `options`
    /// is ignored.
    pub fn open(root: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let root = normalize_root(root.as_ref())?;
        let config_path = root.join(CONFIG_FILE);

        let config = if config::exists(&config_path)? {
            if options != StoreOptions::default() {
                debug!(root = %root.display(), "store already initialized, ignoring options");
            }
            let config = config::load(&config_path)?;
            validate(&config)?;
            config
        } else {
            let config = options.resolve();
            validate(&config)?;
            DirTree::new(config.dmode).ensure(&root)?;
            config::write(&config_path, &config)?;
            debug!(root = %root.display(), "initialized store");
            config
        };

        Self::with_config(root, config)
    }

    /// Open the store at `root` with default options.
    pub fn open_default(root: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(root, StoreOptions::default())
    }

    /// Open an already initialized store. Never creates anything.
    pub fn open_existing(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = normalize_root(root.as_ref())?;
        let config_path = root.join(CONFIG_FILE);
        if !config::exists(&config_path)? {
            return Err(StoreError::Uninitialized(root));
        }
        let config = config::load(&config_path)?;
        validate(&config)?;
        Self::with_config(root, config)
    }

    fn with_config(root: PathBuf, config: StoreConfig) -> StoreResult<Self> {
        let root = fs::canonicalize(&root).map_err(|e| StoreError::from_io(&root, e))?;
        let store = Self {
            root,
            config,
            tree: DirTree::new(config.dmode),
            writer: AtomicWriter::new(config.fmode),
        };
        debug!(store = %store, "opened store");
        Ok(store)
    }

    /// Absolute, canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration the store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Where the object for `digest` lives, whether or not it exists.
    ///
    /// Pure: never touches the filesystem.
    pub fn path_of(&self, digest: &str) -> StoreResult<PathBuf> {
        Ok(self.root.join(shard::shard(digest, self.config.depth)?))
    }

    /// Store content and return its digest.
    ///
    /// Content that is already present is not written again.
    pub fn add(&self, source: impl Into<ContentSource>) -> StoreResult<String> {
        let mut reader = source.into().into_reader()?;
        let digest = digest_reader_restoring(self.config.hash_alg, &mut reader)?;
        let path = self.path_of(&digest)?;

        if is_object(&path)? {
            debug!(digest = %digest, "object already stored");
            return Ok(digest);
        }

        if let Some(parent) = path.parent() {
            self.tree.ensure(parent)?;
        }
        let bytes = self.writer.place(&mut reader, &path)?;
        debug!(digest = %digest, bytes, path = %path.display(), "added object");
        Ok(digest)
    }

    /// Store the content of the regular file at `path`.
    pub fn add_path(&self, path: impl AsRef<Path>) -> StoreResult<String> {
        self.add(ContentSource::from_path(path.as_ref()))
    }

    /// Store an in-memory buffer.
    pub fn add_bytes(&self, data: impl Into<Vec<u8>>) -> StoreResult<String> {
        self.add(ContentSource::from_bytes(data))
    }

    /// Store everything `reader` yields. The reader need not be seekable; its
    /// content is spooled to a temporary file inside the root first.
    pub fn add_reader<R: Read + ?Sized>(&self, reader: &mut R) -> StoreResult<String> {
        self.add(ContentSource::spool(reader, &self.root)?)
    }

    /// Whether an object is stored under `digest`.
    pub fn exists(&self, digest: &str) -> StoreResult<bool> {
        let path = self.key_path(digest)?;
        is_object(&path)
    }

    /// Delete the object for `digest` and prune directories left empty.
    pub fn remove(&self, digest: &str) -> StoreResult<()> {
        let path = self.key_path(digest)?;
        if !is_object(&path)? {
            return Err(StoreError::NotFound(digest.to_string()));
        }
        // Never unlink through a link pointing out of the tree.
        if let Some(parent) = path.parent() {
            self.tree.check_span(parent, &self.root)?;
        }
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(digest.to_string()),
            _ => StoreError::from_io(&path, e),
        })?;
        if let Some(parent) = path.parent() {
            self.tree.prune(parent, &self.root)?;
        }
        debug!(digest = %digest, "removed object");
        Ok(())
    }

    /// Re-hash the stored bytes and compare with `digest`.
    ///
    /// Returns `false` for a corrupted object.
    pub fn check(&self, digest: &str) -> StoreResult<bool> {
        let mut file = self.retrieve(digest)?;
        let actual = digest_reader(self.config.hash_alg, &mut file)?;
        if actual != digest {
            warn!(
                digest = %digest,
                actual = %actual,
                path = %self.key_path(digest)?.display(),
                "stored object is corrupted"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Open the object for `digest` for reading.
    pub fn retrieve(&self, digest: &str) -> StoreResult<File> {
        let path = self.key_path(digest)?;
        if !is_object(&path)? {
            return Err(StoreError::NotFound(digest.to_string()));
        }
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(digest.to_string()),
            _ => StoreError::from_io(&path, e),
        })
    }

    /// Read the whole object for `digest` into memory.
    pub fn read(&self, digest: &str) -> StoreResult<Vec<u8>> {
        let mut data = Vec::new();
        self.retrieve(digest)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Digests of all stored objects.
    pub fn iter(&self) -> Digests {
        Digests::new(&self.root, self.config.depth, self.config.hash_alg)
    }

    /// All stored objects with their paths.
    pub fn objects(&self) -> Objects {
        Objects::new(&self.root, self.config.depth, self.config.hash_alg)
    }

    /// Digests of all objects whose content no longer matches.
    pub fn corrupted(&self) -> Corrupted<'_> {
        Corrupted::new(self)
    }

    /// Number of stored objects.
    pub fn count(&self) -> StoreResult<u64> {
        self.iter().try_fold(0, |n, digest| digest.map(|_| n + 1))
    }

    /// Total size of all stored objects in bytes.
    pub fn size(&self) -> StoreResult<u64> {
        self.objects()
            .try_fold(0, |total: u64, object| -> StoreResult<u64> {
                Ok(total + object?.size()?)
            })
    }

    /// Shard path for a lookup key; keys that cannot be sharded are rejected
    /// as [`StoreError::InvalidKey`].
    fn key_path(&self, digest: &str) -> StoreResult<PathBuf> {
        self.path_of(digest).map_err(|e| StoreError::InvalidKey {
            key: digest.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{root: {}, fmode: {}, dmode: {}, depth: {}, hash_alg: {}}}",
            self.root.display(),
            self.config.fmode,
            self.config.dmode,
            self.config.depth,
            self.config.hash_alg
        )
    }
}

/// Reject configurations whose digests are too short to shard.
fn validate(config: &StoreConfig) -> StoreResult<()> {
    let min = shard::min_digest_len(config.depth);
    let len = config.hash_alg.hex_len();
    if len < min {
        return Err(StoreError::Config(format!(
            "depth {} needs digests of at least {min} characters, {} produces {len}",
            config.depth, config.hash_alg
        )));
    }
    Ok(())
}

/// Whether a regular file sits at `path`.
fn is_object(path: &Path) -> StoreResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(StoreError::from_io(path, e)),
    }
}

/// A missing entry, or a file where a shard directory belongs.
fn is_absent(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::ENOTDIR)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
