//! Directory-tree lifecycle: on-demand creation and upward pruning.

use std::fs::{self, DirBuilder, Metadata};
use std::io;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::mode::Mode;

/// Creates shard directories with a fixed mode and prunes them once empty.
#[derive(Clone, Copy, Debug)]
pub struct DirTree {
    mode: Mode,
}

impl DirTree {
    /// Manager that creates directories with `mode`.
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Mode given to newly created directories.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Create `path` and any missing ancestors.
    ///
    /// Succeeds if `path` already is a directory we can read and write. A
    /// directory created concurrently by someone else counts as success.
    pub fn ensure(&self, path: &Path) -> StoreResult<()> {
        match fs::metadata(path) {
            Ok(meta) => return check_existing(path, &meta),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(StoreError::PermissionDenied(path.to_path_buf()));
            }
            // Missing, or an ancestor is not a directory; the parent check
            // below tells the two apart.
            Err(_) => {}
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.ensure(parent)?;
            }
        }

        match self.builder().create(path) {
            Ok(()) => {
                self.mode
                    .apply_to_path(path)
                    .map_err(|e| StoreError::from_io(path, e))?;
                trace!(path = %path.display(), mode = %self.mode, "created directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let meta = fs::metadata(path).map_err(|e| StoreError::from_io(path, e))?;
                check_existing(path, &meta)
            }
            Err(e) => Err(StoreError::from_io(path, e)),
        }
    }

    /// Remove empty directories from `from` upward, stopping at the first
    /// non-empty one or at `until`, which is never removed.
    ///
    /// Returns how many directories were removed. A symlink anywhere in the
    /// walked span is reported as [`StoreError::UnsafeTreeState`].
    pub fn prune(&self, from: &Path, until: &Path) -> StoreResult<usize> {
        // Check the whole span before removing anything.
        self.check_span(from, until)?;

        let mut removed = 0;
        let mut current = from;
        while current != until {
            match fs::symlink_metadata(current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(StoreError::UnsafeTreeState {
                        path: current.to_path_buf(),
                        reason: "symbolic link in store tree".into(),
                    });
                }
                Ok(meta) if !meta.is_dir() => {
                    return Err(StoreError::NotADirectory(current.to_path_buf()));
                }
                Ok(_) => {
                    if !is_empty_dir(current)? {
                        break;
                    }
                    match fs::remove_dir(current) {
                        Ok(()) => removed += 1,
                        // Repopulated between the check and the removal.
                        Err(_) if !is_empty_dir(current)? => break,
                        Err(e) => return Err(StoreError::from_io(current, e)),
                    }
                }
                // Already pruned by a concurrent remove.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::from_io(current, e)),
            }

            current = match current.parent() {
                Some(parent) => parent,
                None => break,
            };
        }

        if removed > 0 {
            debug!(from = %from.display(), removed, "pruned empty directories");
        }
        Ok(removed)
    }

    /// Verify that `from` lies under `until` and that no directory between
    /// them, `from` included, is a symbolic link.
    pub fn check_span(&self, from: &Path, until: &Path) -> StoreResult<()> {
        if !from.starts_with(until) {
            return Err(StoreError::UnsafeTreeState {
                path: from.to_path_buf(),
                reason: format!("outside of {}", until.display()),
            });
        }
        for ancestor in from.ancestors().take_while(|p| *p != until) {
            match fs::symlink_metadata(ancestor) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(StoreError::UnsafeTreeState {
                        path: ancestor.to_path_buf(),
                        reason: "symbolic link in store tree".into(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn builder(&self) -> DirBuilder {
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(self.mode.bits());
        builder
    }

    #[cfg(not(unix))]
    fn builder(&self) -> DirBuilder {
        DirBuilder::new()
    }
}

fn check_existing(path: &Path, meta: &Metadata) -> StoreResult<()> {
    if !meta.is_dir() {
        return Err(StoreError::NotADirectory(path.to_path_buf()));
    }
    if !can_read_write(path, meta) {
        return Err(StoreError::PermissionDenied(path.to_path_buf()));
    }
    Ok(())
}

fn is_empty_dir(path: &Path) -> StoreResult<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| StoreError::from_io(path, e))?;
    Ok(entries.next().is_none())
}

#[cfg(unix)]
fn can_read_write(path: &Path, _meta: &Metadata) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn can_read_write(_path: &Path, meta: &Metadata) -> bool {
    !meta.permissions().readonly()
}
