//! Atomic content placement.
//!
//! Content is written to a fresh temporary file in the destination's own
//! directory, synced, given its final mode and then renamed over the
//! destination. Observers see either no file or the complete file, never a
//! partial one. On POSIX the rename silently replaces an existing
//! destination; platforms without atomic replace-on-rename are not covered.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::mode::Mode;

/// Prefix of in-flight temporary files. Enumeration skips dot-files, so a
/// crashed write never shows up as a stored object.
pub const TEMP_PREFIX: &str = ".shardfs-tmp-";

/// Writes content to its final path via temp-file-and-rename.
#[derive(Clone, Copy, Debug)]
pub struct AtomicWriter {
    mode: Mode,
}

impl AtomicWriter {
    /// Writer that gives placed files `mode`.
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Mode applied to placed files.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Copy everything `source` yields into `dest`. Returns the byte count.
    ///
    /// Reads from the source's current position. If anything fails before the
    /// rename, the temporary file is removed and `dest` is left untouched.
    pub fn place<R: Read + ?Sized>(&self, source: &mut R, dest: &Path) -> StoreResult<u64> {
        let dir = match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => {
                return Err(StoreError::InvalidInput(format!(
                    "destination {} has no parent directory",
                    dest.display()
                )))
            }
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| StoreError::from_io(dir, e))?;

        let written = io::copy(source, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        self.mode.apply_to_file(tmp.as_file())?;

        // Dropping the PersistError removes the temporary file.
        tmp.persist(dest).map_err(|e| StoreError::Persist {
            path: dest.to_path_buf(),
            source: e.error,
        })?;

        trace!(path = %dest.display(), bytes = written, "placed file");
        Ok(written)
    }

    /// Place the bytes of the regular file at `src` into `dest`.
    pub fn place_file(&self, src: &Path, dest: &Path) -> StoreResult<u64> {
        let mut file = File::open(src).map_err(|e| StoreError::from_io(src, e))?;
        self.place(&mut file, dest)
    }

    /// Place an in-memory buffer into `dest`.
    pub fn place_bytes(&self, data: &[u8], dest: &Path) -> StoreResult<u64> {
        let mut data = data;
        self.place(&mut data, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom};

    /// A reader that fails after yielding some bytes.
    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("disk on fire"));
            }
            let n = self.remaining.min(buf.len());
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn place_writes_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        let writer = AtomicWriter::new(Mode::DEFAULT_FILE);

        let n = writer.place_bytes(b"hello world!!!!", &dest).unwrap();
        assert_eq!(n, 15);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world!!!!");
        assert_eq!(dir_entries(dir.path()), vec!["object".to_string()]);
    }

    #[test]
    fn place_reads_from_current_position() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        let mut cursor = Cursor::new(b"headerbody".to_vec());
        cursor.seek(SeekFrom::Start(6)).unwrap();

        AtomicWriter::new(Mode::DEFAULT_FILE)
            .place(&mut cursor, &dest)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"body");
    }

    #[test]
    fn failed_write_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        let mut reader = FailingReader { remaining: 100_000 };

        let err = AtomicWriter::new(Mode::DEFAULT_FILE)
            .place(&mut reader, &dest)
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!dest.exists());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn failed_write_keeps_previous_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        std::fs::write(&dest, b"previous").unwrap();

        let mut reader = FailingReader { remaining: 10 };
        assert!(AtomicWriter::new(Mode::DEFAULT_FILE)
            .place(&mut reader, &dest)
            .is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    }

    #[test]
    fn rename_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        std::fs::write(&dest, b"old").unwrap();

        AtomicWriter::new(Mode::DEFAULT_FILE)
            .place_bytes(b"new", &dest)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("object");
        assert!(AtomicWriter::new(Mode::DEFAULT_FILE)
            .place_bytes(b"x", &dest)
            .is_err());
    }

    #[test]
    fn bare_file_name_has_no_parent() {
        let err = AtomicWriter::new(Mode::DEFAULT_FILE)
            .place_bytes(b"x", Path::new("object"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[cfg(unix)]
    #[test]
    fn placed_file_gets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("object");
        AtomicWriter::new(Mode::new(0o640).unwrap())
            .place_bytes(b"x", &dest)
            .unwrap();
        let bits = std::fs::metadata(&dest).unwrap().permissions().mode() & 0o7777;
        assert_eq!(bits, 0o640);
    }
}
