//! Content handed to [`Store::add`](crate::Store::add).
//!
//! Both shapes are normalized into one seekable byte source up front, so
//! hashing and copying never need to know where the bytes came from.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// A readable, seekable byte stream.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send + ?Sized> ReadSeek for T {}

/// Boxed byte source produced by normalization.
pub type ContentReader = Box<dyn ReadSeek>;

/// Content to store: a file on disk or an open stream.
pub enum ContentSource {
    /// A regular file to copy from.
    Path(PathBuf),
    /// A stream read from its current position; the position is restored
    /// after hashing so the same bytes are then copied.
    Stream(ContentReader),
}

impl ContentSource {
    /// Source backed by the file at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Source backed by a seekable stream.
    pub fn from_stream<R: Read + Seek + Send + 'static>(stream: R) -> Self {
        Self::Stream(Box::new(stream))
    }

    /// Source backed by an owned buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::from_stream(Cursor::new(data.into()))
    }

    /// Copy a non-seekable reader into an anonymous temporary file in `dir`
    /// and return a stream source over it.
    pub fn spool<R: Read + ?Sized>(reader: &mut R, dir: &Path) -> StoreResult<Self> {
        let mut spool = tempfile::tempfile_in(dir).map_err(|e| StoreError::from_io(dir, e))?;
        io::copy(reader, &mut spool)?;
        spool.rewind()?;
        Ok(Self::from_stream(spool))
    }

    /// Normalize into a byte source. A path must name a regular file.
    pub fn into_reader(self) -> StoreResult<ContentReader> {
        match self {
            Self::Path(path) => {
                let meta = fs::metadata(&path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => {
                        StoreError::InvalidInput(format!("no such file: {}", path.display()))
                    }
                    _ => StoreError::from_io(&path, e),
                })?;
                if !meta.is_file() {
                    return Err(StoreError::InvalidInput(format!(
                        "not a regular file: {}",
                        path.display()
                    )));
                }
                let file = File::open(&path).map_err(|e| StoreError::from_io(&path, e))?;
                Ok(Box::new(file))
            }
            Self::Stream(stream) => Ok(stream),
        }
    }
}

impl From<PathBuf> for ContentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ContentSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ContentSource {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input");
        std::fs::write(&path, b"file content").unwrap();

        let mut reader = ContentSource::from(path.as_path()).into_reader().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"file content");
    }

    #[test]
    fn directory_is_not_a_valid_source() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = ContentSource::from_path(dir.path()).into_reader() else {
            panic!("a directory must not be accepted as content");
        };
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn missing_file_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = ContentSource::from_path(dir.path().join("missing")).into_reader() else {
            panic!("a missing file must not be accepted as content");
        };
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn spool_makes_reader_seekable() {
        let dir = tempfile::tempdir().unwrap();
        let mut input: &[u8] = b"piped bytes";
        let source = ContentSource::spool(&mut input, dir.path()).unwrap();

        let mut reader = source.into_reader().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"piped bytes");
        reader.rewind().unwrap();
        assert_eq!(reader.stream_position().unwrap(), 0);
    }

    #[test]
    fn debug_hides_stream() {
        assert_eq!(format!("{:?}", ContentSource::from_bytes(b"x".to_vec())), "Stream(..)");
    }
}
