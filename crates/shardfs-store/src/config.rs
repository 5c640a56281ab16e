//! Store configuration and its on-disk form.
//!
//! Each root carries one JSON file, written once when the root is created:
//!
//! ```json
//! {
//!   "fmode": "0660",
//!   "dmode": "0770",
//!   "depth": 3,
//!   "hash_alg": "sha1"
//! }
//! ```
//!
//! Older files may spell `depth` as `deep`; [`migrate`] renames recognized
//! legacy keys before the document is validated.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shardfs_crypto::HashAlgorithm;
use tracing::debug;

use crate::atomic::AtomicWriter;
use crate::error::{StoreError, StoreResult};
use crate::mode::Mode;
use crate::shard::Depth;

/// Name of the configuration file inside the store root.
pub const CONFIG_FILE: &str = ".shardfs.conf";

/// Legacy key → current key.
const RENAMED_KEYS: &[(&str, &str)] = &[("deep", "depth")];

/// The fixed configuration of one store root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Mode of stored files.
    pub fmode: Mode,
    /// Mode of tree directories.
    pub dmode: Mode,
    /// Number of shard levels.
    pub depth: Depth,
    /// Digest function naming the objects.
    pub hash_alg: HashAlgorithm,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreOptions::default().resolve()
    }
}

/// Caller-supplied configuration; unset fields fall back to defaults.
///
/// Only used when a root is created. Opening an existing root ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    pub fmode: Option<Mode>,
    pub dmode: Option<Mode>,
    pub depth: Option<Depth>,
    pub hash_alg: Option<HashAlgorithm>,
}

impl StoreOptions {
    pub fn with_fmode(mut self, fmode: Mode) -> Self {
        self.fmode = Some(fmode);
        self
    }

    pub fn with_dmode(mut self, dmode: Mode) -> Self {
        self.dmode = Some(dmode);
        self
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_hash_alg(mut self, hash_alg: HashAlgorithm) -> Self {
        self.hash_alg = Some(hash_alg);
        self
    }

    /// Fill unset fields. The directory mode defaults to the file mode with
    /// search bits added wherever read bits are set.
    pub fn resolve(&self) -> StoreConfig {
        let fmode = self.fmode.unwrap_or_default();
        StoreConfig {
            fmode,
            dmode: self.dmode.unwrap_or_else(|| fmode.with_search_bits()),
            depth: self.depth.unwrap_or_default(),
            hash_alg: self.hash_alg.unwrap_or_default(),
        }
    }
}

/// Rename legacy keys in a raw config document. A current key that is
/// already present wins over its legacy spelling.
pub fn migrate(doc: &mut Map<String, Value>) {
    for (old, new) in RENAMED_KEYS {
        if let Some(value) = doc.remove(*old) {
            if !doc.contains_key(*new) {
                debug!(from = old, to = new, "renaming legacy config key");
                doc.insert((*new).to_string(), value);
            }
        }
    }
}

/// Parse and validate a config document, applying migrations and defaults.
pub fn parse(bytes: &[u8]) -> StoreResult<StoreConfig> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Config(format!("malformed config: {e}")))?;
    let Value::Object(mut doc) = value else {
        return Err(StoreError::Config("config must be a JSON object".into()));
    };
    migrate(&mut doc);
    let options: StoreOptions = serde_json::from_value(Value::Object(doc))
        .map_err(|e| StoreError::Config(e.to_string()))?;
    Ok(options.resolve())
}

/// Serialize a config for writing.
pub fn to_bytes(config: &StoreConfig) -> StoreResult<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(config).map_err(|e| StoreError::Config(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Load the config file at `path`.
pub fn load(path: &Path) -> StoreResult<StoreConfig> {
    let bytes = fs::read(path).map_err(|e| StoreError::from_io(path, e))?;
    parse(&bytes).map_err(|e| match e {
        StoreError::Config(msg) => StoreError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Atomically write `config` to `path`, with the config's file mode.
pub fn write(path: &Path, config: &StoreConfig) -> StoreResult<()> {
    let bytes = to_bytes(config)?;
    AtomicWriter::new(config.fmode).place_bytes(&bytes, path)?;
    Ok(())
}

/// Whether a config file exists at `path`.
pub fn exists(path: &Path) -> StoreResult<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::from_io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.fmode.bits(), 0o660);
        assert_eq!(config.dmode.bits(), 0o770);
        assert_eq!(config.depth, Depth::DEFAULT);
        assert_eq!(config.hash_alg, HashAlgorithm::Sha1);
    }

    #[test]
    fn dmode_follows_fmode_unless_given() {
        let config = StoreOptions::default()
            .with_fmode(Mode::new(0o600).unwrap())
            .resolve();
        assert_eq!(config.dmode.bits(), 0o700);

        let config = StoreOptions::default()
            .with_fmode(Mode::new(0o600).unwrap())
            .with_dmode(Mode::new(0o750).unwrap())
            .resolve();
        assert_eq!(config.dmode.bits(), 0o750);
    }

    #[test]
    fn serialized_defaults_parse_back() {
        let config = StoreConfig::default();
        let bytes = to_bytes(&config).unwrap();
        assert_eq!(parse(&bytes).unwrap(), config);

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"fmode\": \"0660\""));
        assert!(text.contains("\"depth\": 3"));
        assert!(text.contains("\"hash_alg\": \"sha1\""));
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = parse(br#"{"hash_alg": "sha256"}"#).unwrap();
        assert_eq!(config.hash_alg, HashAlgorithm::Sha256);
        assert_eq!(config.depth, Depth::DEFAULT);
        assert_eq!(config.dmode.bits(), 0o770);
    }

    #[test]
    fn legacy_deep_key_is_renamed() {
        let config = parse(br#"{"fmode": "0660", "deep": 4, "hash_alg": "sha1"}"#).unwrap();
        assert_eq!(config.depth.get(), 4);
    }

    #[test]
    fn current_key_beats_legacy_key() {
        let config = parse(br#"{"deep": 4, "depth": 2}"#).unwrap();
        assert_eq!(config.depth.get(), 2);
    }

    #[test]
    fn aliases_are_normalized() {
        let config = parse(br#"{"hash_alg": "sha2"}"#).unwrap();
        assert_eq!(config.hash_alg, HashAlgorithm::Sha512);
        let text = String::from_utf8(to_bytes(&config).unwrap()).unwrap();
        assert!(text.contains("\"sha512\""));
    }

    #[test]
    fn invalid_documents_are_descriptive() {
        let cases: &[(&[u8], &str)] = &[
            (b"not json", "malformed"),
            (b"[1, 2]", "JSON object"),
            (br#"{"depth": -5}"#, "depth"),
            (br#"{"depth": "3"}"#, "i64"),
            (br#"{"fmode": 660}"#, "string"),
            (br#"{"fmode": "rw"}"#, "octal"),
            (br#"{"hash_alg": "verystrangealgorithm"}"#, "verystrangealgorithm"),
        ];
        for (doc, needle) in cases {
            let err = parse(doc).unwrap_err();
            assert!(matches!(err, StoreError::Config(_)), "{err}");
            assert!(err.to_string().contains(needle), "{err} should mention {needle}");
        }
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(!exists(&path).unwrap());

        let config = StoreOptions::default()
            .with_depth(Depth::from(5))
            .with_hash_alg(HashAlgorithm::Md5)
            .resolve();
        write(&path, &config).unwrap();

        assert!(exists(&path).unwrap());
        assert_eq!(load(&path).unwrap(), config);
    }

    #[test]
    fn load_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, b"{").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
