use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use sha2::Digest;

use crate::algorithm::HashAlgorithm;
use crate::error::Result;

/// Block size used when streaming input through a digest.
const BLOCK_SIZE: usize = 64 * 1024;

enum Inner {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

/// Incremental digest over one of the supported algorithms.
pub struct Digester {
    algorithm: HashAlgorithm,
    inner: Inner,
}

impl Digester {
    /// Start a fresh digest.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Md5 => Inner::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => Inner::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha224 => Inner::Sha224(sha2::Sha224::new()),
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => Inner::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => Inner::Sha512(sha2::Sha512::new()),
        };
        Self { algorithm, inner }
    }

    /// The algorithm this digester runs.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Md5(h) => h.update(data),
            Inner::Sha1(h) => h.update(data),
            Inner::Sha224(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
            Inner::Sha384(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
        }
    }

    /// Consume the digester and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self.inner {
            Inner::Md5(h) => hex::encode(h.finalize()),
            Inner::Sha1(h) => hex::encode(h.finalize()),
            Inner::Sha224(h) => hex::encode(h.finalize()),
            Inner::Sha256(h) => hex::encode(h.finalize()),
            Inner::Sha384(h) => hex::encode(h.finalize()),
            Inner::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

impl io::Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for Digester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Digester")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Digest an in-memory byte slice.
pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut digester = Digester::new(algorithm);
    digester.update(data);
    digester.finalize_hex()
}

/// Consume `reader` to EOF and return its hex digest.
pub fn digest_reader<R: Read + ?Sized>(algorithm: HashAlgorithm, reader: &mut R) -> Result<String> {
    let mut digester = Digester::new(algorithm);
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        digester.update(&buf[..n]);
    }
    Ok(digester.finalize_hex())
}

/// Digest `reader` from its current position to EOF, then seek back.
///
/// The position is restored even when reading fails part way through.
pub fn digest_reader_restoring<R: Read + Seek + ?Sized>(
    algorithm: HashAlgorithm,
    reader: &mut R,
) -> Result<String> {
    let start = reader.stream_position()?;
    let result = digest_reader(algorithm, reader);
    reader.seek(SeekFrom::Start(start))?;
    result
}

/// Digest the file at `path`.
pub fn digest_file(algorithm: HashAlgorithm, path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    digest_reader(algorithm, &mut file)
}

/// Returns `true` if the content of `reader` hashes to `expected`.
pub fn verify_hex<R: Read + ?Sized>(
    algorithm: HashAlgorithm,
    reader: &mut R,
    expected: &str,
) -> Result<bool> {
    Ok(digest_reader(algorithm, reader)? == expected)
}
