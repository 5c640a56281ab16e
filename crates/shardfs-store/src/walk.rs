//! Lazy enumeration of stored objects.
//!
//! There is no index: the iterators walk the live tree and pick out regular
//! files sitting exactly `depth` directories below the root whose path spells
//! a well-formed digest. They are
//! one-shot and forward-only. Nothing is snapshotted, so entries added or
//! removed during a walk may or may not be seen; do not rely on a walk that
//! overlaps mutation of the store.

use std::path::{Path, PathBuf};

use shardfs_crypto::HashAlgorithm;
use tracing::warn;
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::error::{StoreError, StoreResult};
use crate::shard::{self, Depth};
use crate::store::Store;

type Walker = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// Dot-entries are never part of the tree: the config file and in-flight
/// temporary files both start with `.`.
fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
}

/// A stored object found by a walk.
#[derive(Debug)]
pub struct ObjectEntry {
    digest: String,
    entry: DirEntry,
}

impl ObjectEntry {
    /// Digest reassembled from the object's shard path.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Absolute path of the object.
    pub fn path(&self) -> &Path {
        self.entry.path()
    }

    /// Size of the object in bytes.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.entry.metadata().map_err(walk_error)?.len())
    }

    pub fn into_digest(self) -> String {
        self.digest
    }
}

/// Iterator over every object in a store.
pub struct Objects {
    root: PathBuf,
    depth: Depth,
    digest_len: usize,
    walker: Walker,
}

impl Objects {
    pub(crate) fn new(root: &Path, depth: Depth, hash_alg: HashAlgorithm) -> Self {
        let level = depth.get() as usize + 1;
        let walker = WalkDir::new(root)
            .min_depth(level)
            .max_depth(level)
            .follow_links(false)
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool);
        Self {
            root: root.to_path_buf(),
            depth,
            digest_len: hash_alg.hex_len(),
            walker,
        }
    }

    fn accept(&self, entry: DirEntry) -> Option<ObjectEntry> {
        if !entry.file_type().is_file() {
            return None;
        }
        let relative = entry.path().strip_prefix(&self.root).ok()?;
        let digest = match shard::unshard(relative) {
            Some(digest) if self.is_digest(&digest) => digest,
            _ => {
                warn!(path = %entry.path().display(), "skipping non-object file in store tree");
                return None;
            }
        };
        // Only files whose location is exactly where their name would shard to.
        match shard::shard(&digest, self.depth) {
            Ok(expected) if expected == relative => Some(ObjectEntry { digest, entry }),
            _ => {
                warn!(path = %entry.path().display(), "skipping misplaced file in store tree");
                None
            }
        }
    }

    fn is_digest(&self, name: &str) -> bool {
        name.len() == self.digest_len
            && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl Iterator for Objects {
    type Item = StoreResult<ObjectEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if let Some(object) = self.accept(entry) {
                        return Some(Ok(object));
                    }
                }
                Err(e) => return Some(Err(walk_error(e))),
            }
        }
    }
}

/// Iterator over the digest of every object in a store.
pub struct Digests {
    objects: Objects,
}

impl Digests {
    pub(crate) fn new(root: &Path, depth: Depth, hash_alg: HashAlgorithm) -> Self {
        Self {
            objects: Objects::new(root, depth, hash_alg),
        }
    }
}

impl Iterator for Digests {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.objects.next()?.map(ObjectEntry::into_digest))
    }
}

/// Iterator over digests whose stored bytes no longer hash to their name.
pub struct Corrupted<'a> {
    store: &'a Store,
    digests: Digests,
}

impl<'a> Corrupted<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            digests: store.iter(),
        }
    }
}

impl Iterator for Corrupted<'_> {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let digest = match self.digests.next()? {
                Ok(digest) => digest,
                Err(e) => return Some(Err(e)),
            };
            match self.store.check(&digest) {
                Ok(true) => {}
                Ok(false) => return Some(Ok(digest)),
                // Removed since the walk saw it.
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn walk_error(err: walkdir::Error) -> StoreError {
    let path = err.path().map(Path::to_path_buf);
    match path {
        Some(path) => StoreError::from_io(path, err.into()),
        None => StoreError::Io(err.into()),
    }
}
